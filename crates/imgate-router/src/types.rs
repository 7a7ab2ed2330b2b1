//! Request payloads the router's strategies parse out of `ImProtoRequest.payload`.

use serde::{Deserialize, Serialize};

/// Payload of a `C2C_SEND` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct C2cSendReq {
    /// Client-supplied dedup key.
    pub client_msg_id: String,
    /// Recipient user id.
    pub to_user: String,
    /// Content format, expected `0..=10`.
    pub format: u8,
    /// Message body, expected at most 10000 bytes.
    pub content: String,
}

/// Payload of a `C2C_ACK` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct C2cAckReq {
    /// The id being acknowledged.
    pub server_msg_id: u64,
    /// Client-supplied dedup key, echoed back.
    pub client_msg_id: String,
    /// One of `{1, 3, 4}`.
    pub status: u8,
    /// The original sender to notify, supplied by the acking client
    /// rather than recovered from retry-queue state, which may already
    /// be gone (downgraded, already acked once, or never enqueued).
    pub to: String,
}

/// Payload of a `WITHDRAW_MSG_SEND` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawReq {
    /// The message being withdrawn.
    pub server_msg_id: u64,
}

/// Payload of a `GET_BATCH_MSG_IDS` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBatchMsgIdsReq {
    /// Chat id to fetch recent server message ids for.
    pub chat_id: String,
}

/// Payload of a `PUSH_BATCH_MSG_IDS` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushBatchMsgIdsResp {
    /// Recent server message ids for the requested chat, newest first.
    pub server_msg_ids: Vec<u64>,
}
