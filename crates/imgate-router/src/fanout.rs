//! Adapts the local session table to [`imgate_rpc::LocalFanOut`]: the
//! trait a peer node's inbound `MessageService` delegates to.

use std::sync::Arc;

use async_trait::async_trait;
use imgate_core::msg::{ImProtoResponse, MsgType, ProtoResponseCode};
use imgate_rpc::generated::{ImProtoRequest, WebBaseResponse};
use imgate_rpc::LocalFanOut;
use imgate_session::SessionTable;
use prost::Message as _;

const CODE_SUCCESS: i32 = 200;
const CODE_NOT_FOUND: i32 = 404;
const CODE_INTERNAL: i32 = 500;

/// Implements the peer-RPC server's local fan-out surface over a
/// [`SessionTable`].
pub struct SessionTableFanOut {
    sessions: Arc<SessionTable>,
}

impl SessionTableFanOut {
    /// Wrap `sessions` as a fan-out target.
    #[must_use]
    pub fn new(sessions: Arc<SessionTable>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl LocalFanOut for SessionTableFanOut {
    async fn is_online_local(&self, user_id: &str) -> bool {
        self.sessions.is_online_local(user_id).await
    }

    async fn broadcast_to_user(&self, user_id: &str, bytes: &[u8]) -> usize {
        let (sent, _err) = self.sessions.broadcast_to_user(user_id, bytes).await;
        sent
    }

    async fn handle_transfer(&self, request: ImProtoRequest) -> WebBaseResponse {
        let envelope: imgate_core::model::C2CMessage = match serde_json::from_slice(&decode_push_payload(&request)) {
            Ok(m) => m,
            Err(_) => {
                return WebBaseResponse {
                    code: CODE_INTERNAL,
                    message: "malformed forwarded push".to_string(),
                };
            }
        };

        // Re-check local presence: the route the origin node used may
        // already be stale by the time this arrives.
        if !self.sessions.is_online_local(&envelope.to_user).await {
            return WebBaseResponse {
                code: CODE_NOT_FOUND,
                message: format!("{} has no local session on this node", envelope.to_user),
            };
        }

        let frame = ImProtoResponse::ok(
            MsgType::C2cMsgPush,
            serde_json::to_vec(&envelope).unwrap_or_default(),
        )
        .encode_to_vec();
        let (sent, _err) = self.sessions.broadcast_to_user(&envelope.to_user, &frame).await;
        if sent == 0 {
            WebBaseResponse {
                code: CODE_NOT_FOUND,
                message: format!("{} had sessions but all sends failed", envelope.to_user),
            }
        } else {
            WebBaseResponse { code: CODE_SUCCESS, message: "ok".to_string() }
        }
    }
}

/// The generated `ImProtoRequest.payload` for `TransferC2CMsg` carries an
/// already-encoded `ImProtoResponse` push frame (see `send.rs`); unwrap
/// that envelope down to the `C2CMessage` JSON it carries.
fn decode_push_payload(request: &ImProtoRequest) -> Vec<u8> {
    ImProtoResponse::decode(request.payload.as_slice())
        .map(|resp| resp.payload)
        .unwrap_or_else(|_| request.payload.clone())
}
