use std::sync::Arc;
use tokio::sync::Mutex;

use crate::common::models::UserId;
use crate::common::throttle::Throttle;
use crate::server::config::ServerConfig;
use crate::server::database::Database;
use crate::server::presence::PresenceTracker;
use crate::server::websocket::ChannelHub;

/// Shared by the HTTP workers and the push-channel listener.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub hub: ChannelHub,
    pub presence: PresenceTracker,
    // limite per coppia (mittente, destinatario)
    pub typing: Arc<Mutex<Throttle<(UserId, UserId)>>>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(db: Database, hub: ChannelHub, config: ServerConfig) -> Self {
        let presence = PresenceTracker::new(db.clone(), hub.clone(), config.presence_grace);
        let typing = Arc::new(Mutex::new(Throttle::new(config.typing_min_interval)));
        Self { db, hub, presence, typing, config }
    }
}
