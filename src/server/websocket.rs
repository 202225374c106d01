use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{tungstenite::Message as WsMessage, WebSocketStream};
use uuid::Uuid;

use crate::common::events::{AuthMessage, AuthResponse, ChannelEvent};
use crate::common::models::UserId;
use crate::server::auth::validate_session;
use crate::server::relay::Relay;
use crate::server::state::AppState;
use crate::utils::logger::redact;

pub type ClientId = String;

struct ChannelSession {
    client_id: ClientId,
    sender: mpsc::UnboundedSender<WsMessage>,
}

/// Registry of open push channels, one logical channel per user fanned out
/// to all of that user's sessions.
#[derive(Clone)]
pub struct ChannelHub {
    // Mappa user_id -> sessioni aperte dell'utente
    sessions: Arc<Mutex<HashMap<UserId, Vec<ChannelSession>>>>,
    instance_id: String,
    relay: Option<Relay>,
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHub {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            instance_id: Uuid::new_v4().to_string(),
            relay: None,
        }
    }

    pub fn with_relay(mut self, relay: Relay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Add a session for `user_id`; frames to push arrive on the receiver.
    pub async fn register(&self, user_id: UserId) -> (ClientId, mpsc::UnboundedReceiver<WsMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = Uuid::new_v4().to_string();
        let mut map = self.sessions.lock().await;
        let entry = map.entry(user_id).or_default();
        entry.push(ChannelSession { client_id: client_id.clone(), sender: tx });
        info!("[CHANNEL] Registered session {} for user {} (total={})", client_id, user_id, entry.len());
        (client_id, rx)
    }

    /// Remove one session; returns how many remain for the user.
    pub async fn unregister(&self, user_id: UserId, client_id: &str) -> usize {
        let mut map = self.sessions.lock().await;
        let remaining = match map.get_mut(&user_id) {
            Some(list) => {
                list.retain(|s| s.client_id != client_id);
                list.len()
            }
            None => 0,
        };
        if remaining == 0 {
            map.remove(&user_id);
        }
        debug!("[CHANNEL] Unregistered session {} for user {} (remaining={})", client_id, user_id, remaining);
        remaining
    }

    pub async fn session_count(&self, user_id: UserId) -> usize {
        let map = self.sessions.lock().await;
        map.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }

    pub async fn is_connected(&self, user_id: UserId) -> bool {
        self.session_count(user_id).await > 0
    }

    /// Deliver to sessions on this instance only. Returns how many got it.
    pub async fn deliver_local(&self, user_id: UserId, event: &ChannelEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                error!("[CHANNEL] Could not serialize {} event: {}", event.kind(), e);
                return 0;
            }
        };
        let mut map = self.sessions.lock().await;
        let Some(list) = map.get_mut(&user_id) else {
            debug!("[CHANNEL] User {} has no open channel, {} dropped", user_id, event.kind());
            return 0;
        };
        // scarta le sessioni il cui task di scrittura è già terminato
        list.retain(|s| s.sender.send(WsMessage::Text(payload.clone())).is_ok());
        let delivered = list.len();
        if list.is_empty() {
            map.remove(&user_id);
        }
        debug!("[CHANNEL] {} -> user {} ({} sessions)", event.kind(), user_id, delivered);
        delivered
    }

    /// Publish to every session of `user_id`, here and on other instances.
    pub async fn publish(&self, user_id: UserId, event: &ChannelEvent) -> usize {
        let delivered = self.deliver_local(user_id, event).await;
        if let Some(relay) = &self.relay {
            if let Err(e) = relay.publish(&self.instance_id, user_id, event).await {
                warn!("[REDIS] Fan-out of {} for user {} failed: {}", event.kind(), user_id, e);
            }
        }
        delivered
    }

    /// Close every channel of a user.
    pub async fn disconnect_user(&self, user_id: UserId) -> usize {
        let mut map = self.sessions.lock().await;
        match map.remove(&user_id) {
            Some(list) => {
                let count = list.len();
                for session in list {
                    let _ = session.sender.send(WsMessage::Close(None));
                }
                info!("[CHANNEL] Closed {} channels for user {}", count, user_id);
                count
            }
            None => 0,
        }
    }
}

async fn send_auth_response(
    ws_sender: &mut futures_util::stream::SplitSink<WebSocketStream<TcpStream>, WsMessage>,
    response: &AuthResponse,
) -> anyhow::Result<()> {
    ws_sender.send(WsMessage::Text(serde_json::to_string(response)?)).await?;
    Ok(())
}

/// Drive one push channel: first-frame authentication, then forward events
/// until either side closes or the credential stops validating.
pub async fn handle_connection(state: AppState, ws_stream: WebSocketStream<TcpStream>) -> anyhow::Result<()> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    debug!("[WS:AUTH] Waiting for authentication from client...");
    let first = tokio::time::timeout(state.config.auth_timeout, ws_receiver.next()).await;

    let auth = match first {
        Ok(Some(Ok(WsMessage::Text(text)))) => match serde_json::from_str::<AuthMessage>(&text) {
            Ok(auth) if auth.message_type == "auth" => auth,
            Ok(_) => {
                send_auth_response(&mut ws_sender, &AuthResponse::rejected("Invalid message type, expected 'auth'")).await?;
                return Err(anyhow::anyhow!("Invalid auth message type"));
            }
            Err(e) => {
                send_auth_response(&mut ws_sender, &AuthResponse::rejected(format!("Invalid JSON: {}", e))).await?;
                return Err(anyhow::anyhow!("Invalid JSON in auth message"));
            }
        },
        Ok(Some(Ok(WsMessage::Close(_)))) | Ok(None) => {
            debug!("[WS:AUTH] Connection closed during auth");
            return Ok(());
        }
        Ok(Some(Ok(_))) => {
            send_auth_response(&mut ws_sender, &AuthResponse::rejected("Expected text message for authentication")).await?;
            return Err(anyhow::anyhow!("Unexpected frame during auth"));
        }
        Ok(Some(Err(e))) => return Err(anyhow::anyhow!("WebSocket error during auth: {}", e)),
        Err(_) => {
            warn!("[WS:AUTH] Authentication timeout");
            let _ = send_auth_response(&mut ws_sender, &AuthResponse::rejected("Authentication timeout")).await;
            return Err(anyhow::anyhow!("Authentication timeout"));
        }
    };

    let user_id = match validate_session(&state.db, &auth.session_token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            info!("[WS:AUTH] Rejected token {}", redact(&auth.session_token));
            send_auth_response(&mut ws_sender, &AuthResponse::rejected("Invalid or expired session token")).await?;
            return Err(anyhow::anyhow!("Authentication failed"));
        }
        Err(e) => {
            send_auth_response(&mut ws_sender, &AuthResponse::rejected(e.to_string())).await?;
            return Err(anyhow::anyhow!("Authentication failed: {}", e));
        }
    };
    send_auth_response(&mut ws_sender, &AuthResponse::accepted(user_id)).await?;
    info!("[WS:AUTH] Authentication successful for user {}", user_id);

    let (client_id, mut outbound) = state.hub.register(user_id).await;
    state.presence.user_connected(user_id).await;

    let mut recheck = tokio::time::interval(state.config.session_check_interval);
    recheck.tick().await;

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(frame) => {
                    let closing = matches!(frame, WsMessage::Close(_));
                    if ws_sender.send(frame).await.is_err() || closing {
                        break;
                    }
                }
                None => break,
            },
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                // il canale è solo in uscita; ping/pong li gestisce tungstenite
                Some(Ok(_)) => {}
            },
            _ = recheck.tick() => {
                match validate_session(&state.db, &auth.session_token).await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        info!("[WS:AUTH] Session of user {} no longer valid, closing channel", user_id);
                        let _ = ws_sender.send(WsMessage::Close(None)).await;
                        break;
                    }
                    Err(e) => warn!("[WS:AUTH] Could not recheck session of user {}: {}", user_id, e),
                }
            }
        }
    }

    state.hub.unregister(user_id, &client_id).await;
    state.presence.user_disconnected(user_id).await;
    info!("[CHANNEL] Channel {} of user {} closed", client_id, user_id);
    Ok(())
}

/// Accept loop of the push-channel listener.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    info!("[CHANNEL] Listening on {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("[CHANNEL] New connection from {}", addr);
        let state = state.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws_stream) => {
                    if let Err(e) = handle_connection(state, ws_stream).await {
                        debug!("[CHANNEL] Connection from {} ended: {}", addr, e);
                    }
                }
                Err(e) => warn!("[CHANNEL] Handshake with {} failed: {}", addr, e),
            }
        });
    }
}
