// Fan-out tra istanze server tramite Redis pub/sub
use futures_util::StreamExt;
use log::{debug, info, warn};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use crate::common::events::ChannelEvent;
use crate::common::models::UserId;
use crate::server::websocket::ChannelHub;

const CHANNEL_PREFIX: &str = "linkup:user:";

#[derive(Debug, Serialize, Deserialize)]
struct RelayEnvelope {
    origin: String,
    user_id: UserId,
    event: ChannelEvent,
}

fn channel_for(user_id: UserId) -> String {
    format!("{}{}", CHANNEL_PREFIX, user_id)
}

/// Publishing half: every event published by a hub is mirrored to Redis so
/// the other instances can deliver it to sessions they hold.
#[derive(Clone)]
pub struct Relay {
    manager: ConnectionManager,
}

impl Relay {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        info!("[REDIS] Connected publisher to {}", redis_url);
        Ok(Self { manager })
    }

    pub async fn publish(&self, origin: &str, user_id: UserId, event: &ChannelEvent) -> anyhow::Result<()> {
        let envelope = RelayEnvelope { origin: origin.to_string(), user_id, event: event.clone() };
        let payload = serde_json::to_string(&envelope)?;
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("PUBLISH")
            .arg(channel_for(user_id))
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Subscribing half. Runs forever, reconnecting every 5 seconds, and hands
/// events coming from other instances to the local hub.
pub fn start_subscriber(redis_url: String, hub: ChannelHub) {
    tokio::spawn(async move {
        loop {
            match subscribe_once(&redis_url, &hub).await {
                Ok(()) => info!("[REDIS] Subscription stream ended"),
                Err(e) => warn!("[REDIS] Subscriber error: {}", e),
            }
            info!("[REDIS] Subscriber disconnected, retrying in 5 seconds...");
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
        }
    });
}

async fn subscribe_once(redis_url: &str, hub: &ChannelHub) -> anyhow::Result<()> {
    let client = redis::Client::open(redis_url)?;
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.psubscribe(format!("{}*", CHANNEL_PREFIX)).await?;
    info!("[REDIS] Subscribed to {}*", CHANNEL_PREFIX);

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(_) => continue,
        };
        match serde_json::from_str::<RelayEnvelope>(&payload) {
            Ok(envelope) if envelope.origin == hub.instance_id() => {}
            Ok(envelope) => {
                debug!("[REDIS] {} for user {} from {}", envelope.event.kind(), envelope.user_id, envelope.origin);
                hub.deliver_local(envelope.user_id, &envelope.event).await;
            }
            Err(e) => warn!("[REDIS] Discarding malformed payload on {}: {}", msg.get_channel_name(), e),
        }
    }
    Ok(())
}
