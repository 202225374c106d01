use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::client::models::session::{Session, SessionContext};
use crate::common::events::{AuthMessage, AuthResponse, ChannelEvent};

/// What the push channel reports to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelNotice {
    /// Authenticated and receiving. `reconnect` is true when this is not the
    /// first connection of the current session: events may have been missed.
    Connected { reconnect: bool },
    Disconnected,
    Event(ChannelEvent),
    /// The server refused the credential; no retry until the session changes.
    AuthRejected,
}

enum Ended {
    Dropped,
    AuthRejected,
}

/// Keeps one push channel open for the current session.
///
/// It connects only while the session has both a token and a resolved
/// identity, reconnects with a fixed delay after any drop, and tears the
/// channel down as soon as the session changes.
pub struct ChannelClient {
    url: String,
    reconnect_delay: Duration,
    auth_timeout: Duration,
    session: SessionContext,
}

impl ChannelClient {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration, session: SessionContext) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            auth_timeout: Duration::from_secs(10),
            session,
        }
    }

    pub fn spawn(self) -> (mpsc::UnboundedReceiver<ChannelNotice>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(tx));
        (rx, handle)
    }

    async fn run(self, tx: mpsc::UnboundedSender<ChannelNotice>) {
        let mut session_rx = self.session.subscribe();
        let mut connected_epoch: Option<u64> = None;

        loop {
            let current: Session = session_rx.borrow_and_update().clone();
            let token = match (&current.token, current.is_ready()) {
                (Some(token), true) => token.clone(),
                _ => {
                    if session_rx.changed().await.is_err() {
                        return;
                    }
                    continue;
                }
            };

            let mut live = false;
            let reconnect = connected_epoch == Some(current.epoch);
            let outcome = tokio::select! {
                ended = self.connect_and_pump(&token, reconnect, &tx, &mut live) => Some(ended),
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    None
                }
            };
            if live {
                connected_epoch = Some(current.epoch);
                if tx.send(ChannelNotice::Disconnected).is_err() {
                    return;
                }
            }

            match outcome {
                // sessione cambiata: si riparte subito con quella nuova
                None => {
                    info!("[CHANNEL] Session changed, channel torn down");
                }
                Some(Ended::AuthRejected) => {
                    warn!("[CHANNEL] Credential refused, waiting for a new session");
                    if tx.send(ChannelNotice::AuthRejected).is_err() || session_rx.changed().await.is_err() {
                        return;
                    }
                }
                Some(Ended::Dropped) => {
                    debug!("[CHANNEL] Reconnecting in {:?}", self.reconnect_delay);
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        changed = session_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn connect_and_pump(
        &self,
        token: &str,
        reconnect: bool,
        tx: &mpsc::UnboundedSender<ChannelNotice>,
        live: &mut bool,
    ) -> Ended {
        debug!("[CHANNEL] Connecting to {}", self.url);
        let (ws_stream, _) = match connect_async(self.url.as_str()).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!("[CHANNEL] Connection failed: {}", e);
                return Ended::Dropped;
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let auth = match serde_json::to_string(&AuthMessage::new(token)) {
            Ok(a) => a,
            Err(_) => return Ended::Dropped,
        };
        if ws_sender.send(WsMessage::Text(auth)).await.is_err() {
            return Ended::Dropped;
        }

        let response = match tokio::time::timeout(self.auth_timeout, ws_receiver.next()).await {
            Ok(Some(Ok(WsMessage::Text(text)))) => match serde_json::from_str::<AuthResponse>(&text) {
                Ok(r) => r,
                Err(e) => {
                    warn!("[CHANNEL] Invalid auth response: {}", e);
                    return Ended::Dropped;
                }
            },
            _ => return Ended::Dropped,
        };
        if !response.success {
            info!("[CHANNEL] Authentication failed: {}", response.error.unwrap_or_default());
            return Ended::AuthRejected;
        }

        *live = true;
        info!("[CHANNEL] Connected (reconnect={})", reconnect);
        if tx.send(ChannelNotice::Connected { reconnect }).is_err() {
            return Ended::Dropped;
        }

        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<ChannelEvent>(&text) {
                    Ok(event) => {
                        if tx.send(ChannelNotice::Event(event)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("[CHANNEL] Unparseable event: {}", e),
                },
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        info!("[CHANNEL] Channel dropped");
        Ended::Dropped
    }
}
