//! Wire-level message types: the `MsgType`/`ProtoResponseCode` enums and the
//! transport-agnostic envelope that carries them.
//!
//! The exact numeric values below are contract-frozen per the external
//! interface: existing clients depend on them bit-exact. The upstream
//! `.proto` definition was not part of the retrieval pack this crate was
//! built from, so these values are this implementation's own assignment;
//! see `DESIGN.md` for that decision.
//!
//! `ImProtoRequest`/`ImProtoResponse` are the client-facing wire envelope
//! and are protobuf-encoded: both derive `::prost::Message` with explicit
//! field tags rather than going through a `.proto`/`build.rs` pipeline,
//! since the two messages are small and fixed and don't warrant the
//! codegen step `imgate-rpc` uses for its larger peer-to-peer surface.

use serde::{Deserialize, Serialize};

/// The enumerated set of application message types the dispatcher routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MsgType {
    /// Transport-level keepalive, also used as the controller's active probe.
    Heartbeat = 0,
    /// Client-to-client send (inbound).
    C2cSend = 1,
    /// Client-to-client ack (inbound).
    C2cAck = 2,
    /// Delivery fan-out to a recipient session (outbound).
    C2cMsgPush = 3,
    /// Server-side receipt ack to the sender (outbound).
    ServerAck = 4,
    /// Delivery notification forwarded to an interested consumer (outbound).
    MsgDeliveryNotification = 5,
    /// Withdraw (recall) request (inbound).
    WithdrawMsgSend = 6,
    /// Response to the withdrawer (outbound).
    WithdrawMsgResponse = 7,
    /// Notification to the peer that a message was withdrawn (outbound).
    MsgWithdrawNotification = 8,
    /// Friend request push (outbound, peer-RPC originated).
    FriendRequest = 9,
    /// Friend response push (outbound, peer-RPC originated).
    FriendResponse = 10,
    /// Batch message id lookup (inbound).
    GetBatchMsgIds = 11,
    /// Batch message id lookup response (outbound).
    PushBatchMsgIds = 12,
}

impl MsgType {
    /// Recover a `MsgType` from its wire value.
    #[must_use]
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Heartbeat),
            1 => Some(Self::C2cSend),
            2 => Some(Self::C2cAck),
            3 => Some(Self::C2cMsgPush),
            4 => Some(Self::ServerAck),
            5 => Some(Self::MsgDeliveryNotification),
            6 => Some(Self::WithdrawMsgSend),
            7 => Some(Self::WithdrawMsgResponse),
            8 => Some(Self::MsgWithdrawNotification),
            9 => Some(Self::FriendRequest),
            10 => Some(Self::FriendResponse),
            11 => Some(Self::GetBatchMsgIds),
            12 => Some(Self::PushBatchMsgIds),
            _ => None,
        }
    }
}

/// Response codes carried in `ImProtoResponse.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ProtoResponseCode {
    /// The request was accepted and processed.
    Success = 0,
    /// The request failed validation.
    InvalidRequest = 1,
    /// The request was rejected due to a capacity limit.
    CapacityExceeded = 2,
    /// An internal error occurred while processing the request.
    InternalError = 3,
    /// The session is not authenticated or the credential was rejected.
    Unauthorized = 4,
}

/// Inbound request envelope. Transport-agnostic: `payload` is parsed by
/// the per-type strategy.
#[derive(Debug, Clone, PartialEq, ::prost::Message)]
pub struct ImProtoRequest {
    /// The message type this payload should be routed by.
    #[prost(uint32, tag = "1")]
    pub msg_type: u32,
    /// Opaque, per-type payload bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

/// Outbound response envelope.
#[derive(Debug, Clone, PartialEq, ::prost::Message)]
pub struct ImProtoResponse {
    /// The message type of this response.
    #[prost(uint32, tag = "1")]
    pub msg_type: u32,
    /// Response status code.
    #[prost(uint32, tag = "2")]
    pub code: u32,
    /// Human-readable status message.
    #[prost(string, tag = "3")]
    pub msg: String,
    /// Opaque, per-type payload bytes.
    #[prost(bytes = "vec", tag = "4")]
    pub payload: Vec<u8>,
}

impl ImProtoResponse {
    /// Build a success response of the given type with a JSON-encoded payload.
    #[must_use]
    pub fn ok(msg_type: MsgType, payload: Vec<u8>) -> Self {
        Self {
            msg_type: msg_type as u32,
            code: ProtoResponseCode::Success as u32,
            msg: String::new(),
            payload,
        }
    }

    /// Build an error response carrying no payload.
    #[must_use]
    pub fn error(msg_type: MsgType, code: ProtoResponseCode, msg: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type as u32,
            code: code as u32,
            msg: msg.into(),
            payload: Vec::new(),
        }
    }
}
