//! The `C2C_ACK` strategy: dequeue the retry entry, then route the ack
//! back to the original sender through the same three-way dispatch the
//! send path uses.

use std::sync::Arc;

use async_trait::async_trait;
use imgate_core::model::{AckRecord, AckStatus, ClusterEvent, ClusterEventType};
use imgate_core::msg::{ImProtoRequest, ImProtoResponse, MsgType, ProtoResponseCode};
use imgate_dispatcher::Strategy;
use imgate_session::Session;
use imgate_storage::RetryStore;
use prost::Message as _;
use tracing::info;

use crate::dispatch::{three_way_dispatch, DispatchContext};
use crate::error::AckValidationError;
use crate::types::C2cAckReq;

fn validate(req: &C2cAckReq) -> Result<AckStatus, AckValidationError> {
    if req.server_msg_id == 0 {
        return Err(AckValidationError::MissingServerMsgId);
    }
    if req.client_msg_id.is_empty() {
        return Err(AckValidationError::MissingClientMsgId);
    }
    if req.to.is_empty() {
        return Err(AckValidationError::MissingSender);
    }
    AckStatus::from_u8(req.status).ok_or(AckValidationError::InvalidStatus)
}

/// Delivers `C2C_ACK`: the recipient side reporting delivery status back
/// to the original sender.
pub struct AckStrategy {
    ctx: Arc<DispatchContext>,
    retry: Arc<RetryStore>,
}

impl AckStrategy {
    /// Build an ack strategy.
    #[must_use]
    pub fn new(ctx: Arc<DispatchContext>, retry: Arc<RetryStore>) -> Self {
        Self { ctx, retry }
    }
}

#[async_trait]
impl Strategy for AckStrategy {
    async fn handle(&self, session: &Arc<Session>, request: ImProtoRequest) -> ImProtoResponse {
        let req: C2cAckReq = match serde_json::from_slice(&request.payload) {
            Ok(r) => r,
            Err(e) => {
                return ImProtoResponse::error(
                    MsgType::ServerAck,
                    ProtoResponseCode::InvalidRequest,
                    format!("malformed payload: {e}"),
                );
            }
        };

        let status = match validate(&req) {
            Ok(s) => s,
            Err(e) => {
                return ImProtoResponse::error(MsgType::ServerAck, ProtoResponseCode::InvalidRequest, e.to_string());
            }
        };

        // Dequeue before notifying: once the sender's view of the retry
        // schedule is gone, a concurrent redelivery attempt must not race
        // ahead of this ack reaching them.
        if let Err(e) = self.retry.remove(req.server_msg_id).await {
            tracing::warn!(server_msg_id = req.server_msg_id, error = %e, "failed to dequeue retry entry on ack");
        }

        let ack = AckRecord {
            client_msg_id: req.client_msg_id.clone(),
            server_msg_id: req.server_msg_id,
            from: session.user_id.clone(),
            to: req.to.clone(),
            status,
        };

        let ack_event = ClusterEvent {
            cluster_event_type: ClusterEventType::C2cAck,
            data: serde_json::json!({
                "server_msg_id": req.server_msg_id,
                "from": ack.from,
                "status": req.status,
            }),
        };

        // The sender to notify comes from the ack request's own `to`
        // field, not from retry-queue survival: the retry entry may
        // already be gone (downgraded, already acked once, or never
        // enqueued for this send), and notification must not depend on it.
        let frame = ImProtoResponse::ok(
            MsgType::MsgDeliveryNotification,
            serde_json::to_vec(&ack).unwrap_or_default(),
        )
        .encode_to_vec();
        let outcome = three_way_dispatch(&self.ctx, &req.to, frame, ack_event).await;
        info!(server_msg_id = req.server_msg_id, to_user = %req.to, ?outcome, "ack routed to sender");

        ImProtoResponse::ok(MsgType::ServerAck, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_zero_server_msg_id() {
        let req = C2cAckReq { server_msg_id: 0, client_msg_id: "c1".to_string(), status: 1, to: "alice".to_string() };
        assert_eq!(validate(&req), Err(AckValidationError::MissingServerMsgId));
    }

    #[test]
    fn validation_rejects_unknown_status() {
        let req = C2cAckReq { server_msg_id: 1, client_msg_id: "c1".to_string(), status: 2, to: "alice".to_string() };
        assert_eq!(validate(&req), Err(AckValidationError::InvalidStatus));
    }

    #[test]
    fn validation_rejects_missing_sender() {
        let req = C2cAckReq { server_msg_id: 1, client_msg_id: "c1".to_string(), status: 4, to: String::new() };
        assert_eq!(validate(&req), Err(AckValidationError::MissingSender));
    }

    #[test]
    fn valid_ack_passes() {
        let req = C2cAckReq { server_msg_id: 1, client_msg_id: "c1".to_string(), status: 4, to: "alice".to_string() };
        assert_eq!(validate(&req), Ok(AckStatus::Read));
    }
}
