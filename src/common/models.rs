// Common models shared between client and server
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub type UserId = i64;
pub type MessageId = i64;
pub type ConnectionId = i64;

/// Default number of messages in a history page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Second-precision UTC instant.
///
/// On the wire it is the 7-field calendar tuple
/// `[year, month, day, hour, minute, second, nanosecond]`; the nanosecond
/// field is always zero because the value is truncated to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub fn now() -> Self {
        Self::from_unix(Utc::now().timestamp())
    }

    pub fn from_unix(secs: i64) -> Self {
        let dt = DateTime::<Utc>::from_timestamp(secs, 0)
            .map(|d| d.naive_utc())
            .unwrap_or_default();
        Timestamp(dt)
    }

    pub fn unix(&self) -> i64 {
        self.0.and_utc().timestamp()
    }

    pub fn from_parts(parts: &[i64]) -> Option<Self> {
        if parts.len() < 6 {
            return None;
        }
        let date = NaiveDate::from_ymd_opt(
            i32::try_from(parts[0]).ok()?,
            u32::try_from(parts[1]).ok()?,
            u32::try_from(parts[2]).ok()?,
        )?;
        let dt = date.and_hms_opt(
            u32::try_from(parts[3]).ok()?,
            u32::try_from(parts[4]).ok()?,
            u32::try_from(parts[5]).ok()?,
        )?;
        Some(Timestamp(dt))
    }

    pub fn to_parts(&self) -> [i64; 7] {
        [
            self.0.year() as i64,
            self.0.month() as i64,
            self.0.day() as i64,
            self.0.hour() as i64,
            self.0.minute() as i64,
            self.0.second() as i64,
            0,
        ]
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_parts().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = Vec::<i64>::deserialize(deserializer)?;
        Timestamp::from_parts(&parts)
            .ok_or_else(|| serde::de::Error::custom("invalid calendar tuple"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub read: bool,
}

impl Message {
    /// The other participant, seen from `me`.
    pub fn partner_of(&self, me: UserId) -> UserId {
        if self.sender_id == me {
            self.receiver_id
        } else {
            self.sender_id
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.sender_id == user || self.receiver_id == user
    }
}

/// One page of conversation history, oldest message first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    #[serde(rename = "startOfChatReached")]
    pub reached_start: bool,
}

/// Accepted connection as returned by `GET /connections`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub username: String,
    pub connected_at: Timestamp,
    pub last_message_sent_at: Option<Timestamp>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub is_online: bool,
}

/// Pending incoming request as returned by `GET /connections/requests`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub connection_id: ConnectionId,
    pub requester_id: UserId,
    pub requester_name: String,
    pub sent_at: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// Who the bearer credential belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: UserId,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    pub receiver_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message: String,
    pub data: Message,
}
