//! The `C2C_SEND` strategy: validate, assign an id, publish to the bus,
//! then three-way dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use imgate_core::ids::Snowflake;
use imgate_core::model::{C2CMessage, ClusterEvent, ClusterEventType};
use imgate_core::msg::{ImProtoRequest, ImProtoResponse, MsgType, ProtoResponseCode};
use imgate_dispatcher::Strategy;
use imgate_session::Session;
use imgate_storage::bus;
use imgate_storage::RetryStore;
use prost::Message as _;
use tracing::info;

use crate::dispatch::{first_retry_entry, offline_send_event, three_way_dispatch, DispatchContext, DispatchOutcome};
use crate::error::SendValidationError;
use crate::types::C2cSendReq;

const MAX_CONTENT_BYTES: usize = 10_000;
const MAX_FORMAT: u8 = 10;

fn validate(req: &C2cSendReq) -> Result<(), SendValidationError> {
    if req.to_user.is_empty() {
        return Err(SendValidationError::MissingRecipient);
    }
    if req.client_msg_id.is_empty() {
        return Err(SendValidationError::MissingClientMsgId);
    }
    if req.content.len() > MAX_CONTENT_BYTES {
        return Err(SendValidationError::ContentTooLarge);
    }
    if req.format > MAX_FORMAT {
        return Err(SendValidationError::InvalidFormat);
    }
    Ok(())
}

/// Delivers `C2C_SEND`: the origin side of every message send.
pub struct SendStrategy {
    ctx: Arc<DispatchContext>,
    retry: Arc<RetryStore>,
    retry_delays_secs: Vec<u64>,
    max_retries: u32,
}

impl SendStrategy {
    /// Build a send strategy. `retry_delays_secs` must have length
    /// `max_retries`.
    #[must_use]
    pub fn new(
        ctx: Arc<DispatchContext>,
        retry: Arc<RetryStore>,
        retry_delays_secs: Vec<u64>,
        max_retries: u32,
    ) -> Self {
        Self { ctx, retry, retry_delays_secs, max_retries }
    }
}

#[async_trait]
impl Strategy for SendStrategy {
    async fn handle(&self, session: &Arc<Session>, request: ImProtoRequest) -> ImProtoResponse {
        let req: C2cSendReq = match serde_json::from_slice(&request.payload) {
            Ok(r) => r,
            Err(e) => {
                return ImProtoResponse::error(
                    MsgType::ServerAck,
                    ProtoResponseCode::InvalidRequest,
                    format!("malformed payload: {e}"),
                );
            }
        };

        if let Err(e) = validate(&req) {
            return ImProtoResponse::error(MsgType::ServerAck, ProtoResponseCode::InvalidRequest, e.to_string());
        }

        let server_msg_id = match Snowflake::global().next_id() {
            Ok(id) => id,
            Err(e) => {
                return ImProtoResponse::error(
                    MsgType::ServerAck,
                    ProtoResponseCode::InternalError,
                    format!("id assignment failed: {e}"),
                );
            }
        };

        let message = C2CMessage::new(
            req.client_msg_id.clone(),
            server_msg_id,
            session.user_id.clone(),
            req.to_user.clone(),
            req.format,
            req.content.clone(),
            now_ms(),
        );

        let send_event = ClusterEvent {
            cluster_event_type: ClusterEventType::C2cSend,
            data: serde_json::json!({
                "server_msg_id": server_msg_id,
                "from_user": message.from_user,
                "to_user": message.to_user,
                "chat_id": message.chat_id,
            }),
        };
        bus::publish_best_effort(self.ctx.bus.as_ref(), &server_msg_id.to_string(), &send_event).await;

        let push_frame = ImProtoResponse::ok(
            MsgType::C2cMsgPush,
            serde_json::to_vec(&message).unwrap_or_default(),
        )
        .encode_to_vec();

        let outcome = three_way_dispatch(
            &self.ctx,
            &req.to_user,
            push_frame,
            offline_send_event(server_msg_id),
        )
        .await;

        if matches!(outcome, DispatchOutcome::LocalFanOut | DispatchOutcome::PeerForwarded) {
            let delay = self.retry_delays_secs.first().copied().unwrap_or(5);
            let entry = first_retry_entry(message, self.max_retries, delay);
            if let Err(e) = self.retry.enqueue(&entry).await {
                tracing::warn!(server_msg_id, error = %e, "failed to enqueue retry entry");
            }
        }

        info!(server_msg_id, to_user = %req.to_user, ?outcome, "c2c send dispatched");
        ImProtoResponse::ok(MsgType::ServerAck, serde_json::to_vec(&server_msg_id).unwrap_or_default())
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}
