//! The `WITHDRAW_MSG_SEND` strategy: recall a message sent within the
//! last two minutes and notify the recipient it was withdrawn.
//!
//! Supplemental feature carried over from the original system, not named
//! in the distilled spec's module list but present in its source.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use imgate_core::msg::{ImProtoRequest, ImProtoResponse, MsgType, ProtoResponseCode};
use imgate_dispatcher::Strategy;
use imgate_session::Session;
use imgate_storage::RetryStore;
use prost::Message as _;
use tracing::info;

use crate::dispatch::{three_way_dispatch, DispatchContext};
use crate::types::WithdrawReq;

/// Window, in milliseconds, within which a message may still be recalled.
const WITHDRAW_WINDOW_MS: i64 = 2 * 60 * 1000;

/// Delivers `WITHDRAW_MSG_SEND`.
pub struct WithdrawStrategy {
    ctx: Arc<DispatchContext>,
    retry: Arc<RetryStore>,
}

impl WithdrawStrategy {
    /// Build a withdraw strategy.
    #[must_use]
    pub fn new(ctx: Arc<DispatchContext>, retry: Arc<RetryStore>) -> Self {
        Self { ctx, retry }
    }
}

#[async_trait]
impl Strategy for WithdrawStrategy {
    async fn handle(&self, session: &Arc<Session>, request: ImProtoRequest) -> ImProtoResponse {
        let req: WithdrawReq = match serde_json::from_slice(&request.payload) {
            Ok(r) => r,
            Err(e) => {
                return ImProtoResponse::error(
                    MsgType::WithdrawMsgResponse,
                    ProtoResponseCode::InvalidRequest,
                    format!("malformed payload: {e}"),
                );
            }
        };

        let Some(entry) = self.retry.get(req.server_msg_id).await.ok().flatten() else {
            return ImProtoResponse::error(
                MsgType::WithdrawMsgResponse,
                ProtoResponseCode::InvalidRequest,
                "message is no longer withdrawable",
            );
        };

        if entry.message.from_user != session.user_id {
            return ImProtoResponse::error(
                MsgType::WithdrawMsgResponse,
                ProtoResponseCode::Unauthorized,
                "only the sender may withdraw a message",
            );
        }

        let age_ms = now_ms() - entry.message.create_time;
        if age_ms > WITHDRAW_WINDOW_MS {
            return ImProtoResponse::error(
                MsgType::WithdrawMsgResponse,
                ProtoResponseCode::InvalidRequest,
                "withdraw window has expired",
            );
        }

        if let Err(e) = self.retry.remove(req.server_msg_id).await {
            tracing::warn!(server_msg_id = req.server_msg_id, error = %e, "failed to dequeue retry entry on withdraw");
        }

        let notify_frame = ImProtoResponse::ok(
            MsgType::MsgWithdrawNotification,
            serde_json::to_vec(&req.server_msg_id).unwrap_or_default(),
        )
        .encode_to_vec();
        let offline_event = imgate_core::model::ClusterEvent {
            cluster_event_type: imgate_core::model::ClusterEventType::C2cOffline,
            data: serde_json::json!({ "server_msg_id": req.server_msg_id, "withdrawn": true }),
        };
        let outcome =
            three_way_dispatch(&self.ctx, &entry.message.to_user, notify_frame, offline_event).await;

        info!(server_msg_id = req.server_msg_id, to_user = %entry.message.to_user, ?outcome, "message withdrawn");
        ImProtoResponse::ok(MsgType::WithdrawMsgResponse, Vec::new())
    }
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgate_core::model::C2CMessage;

    #[test]
    fn window_constant_is_two_minutes() {
        assert_eq!(WITHDRAW_WINDOW_MS, 120_000);
    }

    #[test]
    fn age_past_window_is_detected() {
        let message = C2CMessage::new(
            "c1".to_string(),
            1,
            "alice".to_string(),
            "bob".to_string(),
            0,
            "hi".to_string(),
            0,
        );
        let age_ms = 1_000_000_i64 - message.create_time;
        assert!(age_ms > WITHDRAW_WINDOW_MS);
    }
}
