//! Domain data model shared across the session, dispatcher, router and
//! retry subsystems: `C2CMessage`, `AckRecord`, `RetryEntry`, and the
//! presence directory's value types.

use serde::{Deserialize, Serialize};

use crate::ids::chat_id;

/// Delivery status carried on an ack record and on retry entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AckStatus {
    /// The server received and is attempting delivery.
    ServerReceived = 1,
    /// Delivered to the recipient's device but not yet read.
    DeliveredUnread = 3,
    /// Read by the recipient.
    Read = 4,
}

impl AckStatus {
    /// Parse a raw status value, rejecting anything outside `{1,3,4}`.
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::ServerReceived),
            3 => Some(Self::DeliveredUnread),
            4 => Some(Self::Read),
            _ => None,
        }
    }
}

/// A client-to-client message, from first server receipt through any
/// number of redeliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct C2CMessage {
    /// Client-supplied dedup key (UUID, stringified).
    pub client_msg_id: String,
    /// Server-assigned monotonic id. Never zero once accepted.
    pub server_msg_id: u64,
    /// Sender's user id.
    pub from_user: String,
    /// Recipient's user id.
    pub to_user: String,
    /// Deterministic, symmetric chat id for the `(from, to)` pair.
    pub chat_id: String,
    /// Content format, `0..=10`.
    pub format: u8,
    /// Message body, at most 10000 bytes.
    pub content: String,
    /// Creation time, ms since Unix epoch.
    pub create_time: i64,
}

impl C2CMessage {
    /// Build a message, deriving `chat_id` from `from_user`/`to_user`.
    #[must_use]
    pub fn new(
        client_msg_id: String,
        server_msg_id: u64,
        from_user: String,
        to_user: String,
        format: u8,
        content: String,
        create_time: i64,
    ) -> Self {
        let chat_id = chat_id(&from_user, &to_user);
        Self {
            client_msg_id,
            server_msg_id,
            from_user,
            to_user,
            chat_id,
            format,
            content,
            create_time,
        }
    }
}

/// An acknowledgement of a previously delivered `C2CMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckRecord {
    /// Echoes the original `client_msg_id`.
    pub client_msg_id: String,
    /// Echoes the original `server_msg_id`.
    pub server_msg_id: u64,
    /// The acking party (the original recipient).
    pub from: String,
    /// The original sender, who receives this ack routed back.
    pub to: String,
    /// Delivery status being reported.
    pub status: AckStatus,
}

/// A message awaiting redelivery, as stored in the shared delay queue's
/// side index (`im:c2c:retry:index`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEntry {
    /// The message being retried.
    pub message: C2CMessage,
    /// Number of redeliveries already attempted.
    pub retry_count: u32,
    /// Configured maximum retry count (`len(retry_delays)`).
    pub max_retries: u32,
    /// Next scheduled fire time, ms since Unix epoch.
    pub next_fire_time_ms: i64,
}

impl RetryEntry {
    /// Build the first retry entry for a message that was just sent to a
    /// claimed-online recipient.
    #[must_use]
    pub fn first(message: C2CMessage, max_retries: u32, next_fire_time_ms: i64) -> Self {
        Self {
            message,
            retry_count: 0,
            max_retries,
            next_fire_time_ms,
        }
    }

    /// Whether this entry has exhausted its retry budget.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Online/offline state for a user as recorded in the presence directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceStatus {
    /// No entry: the user has never registered a session, or it was cleared.
    Absent,
    /// `"5"` in the wire schema.
    Online,
    /// `"0"` in the wire schema.
    Offline,
}

impl PresenceStatus {
    /// Parse the wire representation (`"5"` / `"0"`), `None` entries map to
    /// [`PresenceStatus::Absent`].
    #[must_use]
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            Some("5") => Self::Online,
            Some("0") => Self::Offline,
            _ => Self::Absent,
        }
    }

    /// The wire representation of this status.
    #[must_use]
    pub fn to_wire(self) -> &'static str {
        match self {
            Self::Online => "5",
            Self::Offline => "0",
            Self::Absent => "",
        }
    }
}

/// A recipient's resolved presence: status plus, when online, the node
/// that owns their primary session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    /// Current status.
    pub status: PresenceStatus,
    /// `host:port` of the owning node, meaningful only when `status` is
    /// [`PresenceStatus::Online`].
    pub route: Option<String>,
}

/// A durable-bus event tag, matching `ClusterEvent.cluster_event_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterEventType {
    /// A send was accepted by the origin node (`C2C_SEND_MSG`).
    C2cSend,
    /// A message was downgraded to offline persistence (`C2C_OFF_LINE_MSG`).
    C2cOffline,
    /// A delivery was acknowledged by the recipient.
    C2cAck,
}

/// Event published to the durable bus topic `XZLL_C2CMSG_TOPIC`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvent {
    /// Which kind of event this is.
    pub cluster_event_type: ClusterEventType,
    /// Event payload, serialized as JSON.
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c2c_message_derives_symmetric_chat_id() {
        let m1 = C2CMessage::new(
            "c1".into(),
            1,
            "alice".into(),
            "bob".into(),
            0,
            "hi".into(),
            0,
        );
        let m2 = C2CMessage::new(
            "c2".into(),
            2,
            "bob".into(),
            "alice".into(),
            0,
            "hi".into(),
            0,
        );
        assert_eq!(m1.chat_id, m2.chat_id);
    }

    #[test]
    fn presence_wire_roundtrip() {
        assert_eq!(PresenceStatus::from_wire(Some("5")), PresenceStatus::Online);
        assert_eq!(
            PresenceStatus::from_wire(Some("0")),
            PresenceStatus::Offline
        );
        assert_eq!(PresenceStatus::from_wire(None), PresenceStatus::Absent);
        assert_eq!(PresenceStatus::Online.to_wire(), "5");
    }

    #[test]
    fn ack_status_rejects_unknown_values() {
        assert!(AckStatus::from_u8(2).is_none());
        assert_eq!(AckStatus::from_u8(1), Some(AckStatus::ServerReceived));
    }
}
