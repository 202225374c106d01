use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::common::events::{ChannelEvent, PresenceEvent};
use crate::common::models::UserId;
use crate::server::connections;
use crate::server::database::Database;
use crate::server::websocket::ChannelHub;

#[derive(Default)]
struct PresenceInner {
    online: HashSet<UserId>,
    // disconnessioni in attesa della fine del periodo di grazia
    pending_offline: HashMap<UserId, JoinHandle<()>>,
}

/// Who is online, and the broadcasts of each transition to the user's
/// connections.
///
/// A user is online while at least one channel session is open. Losing the
/// last session starts a grace timer; the offline transition is published
/// only if no session came back when it fires.
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<Mutex<PresenceInner>>,
    hub: ChannelHub,
    db: Database,
    grace: Duration,
}

impl PresenceTracker {
    pub fn new(db: Database, hub: ChannelHub, grace: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(PresenceInner::default())), hub, db, grace }
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.lock().await.online.contains(&user_id)
    }

    pub async fn user_connected(&self, user_id: UserId) {
        let newly_online = {
            let mut inner = self.inner.lock().await;
            if let Some(timer) = inner.pending_offline.remove(&user_id) {
                timer.abort();
                debug!("[PRESENCE] User {} reconnected within grace period", user_id);
            }
            inner.online.insert(user_id)
        };
        if newly_online {
            info!("[PRESENCE] User {} is online", user_id);
            self.broadcast(user_id, true).await;
        }
    }

    pub async fn user_disconnected(&self, user_id: UserId) {
        if self.hub.is_connected(user_id).await {
            debug!("[PRESENCE] User {} still has open sessions", user_id);
            return;
        }

        let tracker = self.clone();
        let mut inner = self.inner.lock().await;
        if !inner.online.contains(&user_id) || inner.pending_offline.contains_key(&user_id) {
            return;
        }
        let timer = tokio::spawn(async move {
            tokio::time::sleep(tracker.grace).await;
            tracker.finish_offline(user_id).await;
        });
        inner.pending_offline.insert(user_id, timer);
    }

    async fn finish_offline(&self, user_id: UserId) {
        let went_offline = {
            let mut inner = self.inner.lock().await;
            inner.pending_offline.remove(&user_id);
            if self.hub.is_connected(user_id).await {
                false
            } else {
                inner.online.remove(&user_id)
            }
        };
        if went_offline {
            info!("[PRESENCE] User {} is offline", user_id);
            self.broadcast(user_id, false).await;
        }
    }

    async fn broadcast(&self, user_id: UserId, is_online: bool) {
        let partners = match connections::partner_ids(&self.db, user_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!("[PRESENCE] Could not load connections of {}: {}", user_id, e);
                return;
            }
        };
        let event = ChannelEvent::Presence(PresenceEvent { user_id, is_online });
        for partner in partners {
            self.hub.publish(partner, &event).await;
        }
    }
}
