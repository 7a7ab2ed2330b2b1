//! Router validation errors.

use thiserror::Error;

/// Validation failures for a `C2C_SEND` request, fail-fast per field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendValidationError {
    /// `to_user` was empty.
    #[error("recipient is required")]
    MissingRecipient,
    /// `client_msg_id` was empty.
    #[error("client_msg_id is required")]
    MissingClientMsgId,
    /// `content` exceeded 10000 bytes.
    #[error("content exceeds the maximum size")]
    ContentTooLarge,
    /// `format` was outside `0..=10`.
    #[error("format out of range")]
    InvalidFormat,
}

/// Validation failures for a `C2C_ACK` request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AckValidationError {
    /// `server_msg_id` was zero.
    #[error("server_msg_id must be non-zero")]
    MissingServerMsgId,
    /// `client_msg_id` was empty.
    #[error("client_msg_id is required")]
    MissingClientMsgId,
    /// `status` was outside `{1, 3, 4}`.
    #[error("status must be one of {{1, 3, 4}}")]
    InvalidStatus,
    /// `to` was empty.
    #[error("to is required")]
    MissingSender,
}
