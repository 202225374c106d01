// Eventi del canale push e handshake di autenticazione
use serde::{Deserialize, Serialize};

use crate::common::models::{Message, UserId};

/// Everything that travels on a user's push channel.
///
/// Serialized as an internally tagged object, e.g.
/// `{"type":"typing","senderId":4,"isTyping":true}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    NewMessage(Message),
    Typing(TypingEvent),
    ReadReceipt(ReadReceiptEvent),
    Presence(PresenceEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub sender_id: UserId,
    pub is_typing: bool,
}

/// Sent to the reader's own sessions: "you read everything from `sender_id`".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptEvent {
    pub sender_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub user_id: UserId,
    pub is_online: bool,
}

impl ChannelEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelEvent::NewMessage(_) => "new_message",
            ChannelEvent::Typing(_) => "typing",
            ChannelEvent::ReadReceipt(_) => "read_receipt",
            ChannelEvent::Presence(_) => "presence",
        }
    }
}

// Primo frame inviato dal client dopo l'handshake WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthMessage {
    pub message_type: String, // "auth"
    pub session_token: String,
}

impl AuthMessage {
    pub fn new(session_token: impl Into<String>) -> Self {
        Self {
            message_type: "auth".to_string(),
            session_token: session_token.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message_type: String, // "auth_response"
    pub success: bool,
    pub user_id: Option<UserId>,
    pub error: Option<String>,
}

impl AuthResponse {
    pub fn accepted(user_id: UserId) -> Self {
        Self {
            message_type: "auth_response".to_string(),
            success: true,
            user_id: Some(user_id),
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            message_type: "auth_response".to_string(),
            success: false,
            user_id: None,
            error: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::Timestamp;

    #[test]
    fn typing_event_wire_shape() {
        let ev = ChannelEvent::Typing(TypingEvent { sender_id: 4, is_typing: true });
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "typing");
        assert_eq!(json["senderId"], 4);
        assert_eq!(json["isTyping"], true);
    }

    #[test]
    fn new_message_event_flattens_message_fields() {
        let msg = Message {
            id: 11,
            sender_id: 1,
            receiver_id: 2,
            content: "ciao".into(),
            timestamp: Timestamp::from_unix(1_700_000_000),
            read: false,
        };
        let text = serde_json::to_string(&ChannelEvent::NewMessage(msg.clone())).unwrap();
        let back: ChannelEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ChannelEvent::NewMessage(msg));
        assert!(text.contains(r#""type":"new_message""#));
    }

    #[test]
    fn auth_frames_have_expected_type_tags() {
        assert_eq!(AuthMessage::new("tok").message_type, "auth");
        let rejected = AuthResponse::rejected("nope");
        assert!(!rejected.success);
        assert_eq!(rejected.error.as_deref(), Some("nope"));
    }
}
