//! Inbound `MessageService` handler: the far side of a peer forward.

use async_trait::async_trait;
use tonic::{Request, Response, Status};

use crate::generated::message_service_server::MessageService;
use crate::generated::{
    ClientAckPush, FriendRequestPush, FriendResponsePush, ImProtoRequest, ServerAckPush,
    WebBaseResponse, WithdrawPush,
};

const CODE_SUCCESS: i32 = 200;
const CODE_NOT_FOUND: i32 = 404;
const CODE_INTERNAL: i32 = 500;

fn ok() -> WebBaseResponse {
    WebBaseResponse { code: CODE_SUCCESS, message: "ok".to_string() }
}

fn not_found(message: impl Into<String>) -> WebBaseResponse {
    WebBaseResponse { code: CODE_NOT_FOUND, message: message.into() }
}

fn internal(message: impl Into<String>) -> WebBaseResponse {
    WebBaseResponse { code: CODE_INTERNAL, message: message.into() }
}

/// The local fan-out surface `MessageServiceImpl` delegates to.
///
/// Kept as a narrow trait rather than a direct dependency on the session
/// table so this crate stays free of any particular session-table
/// implementation. `bytes` is an already-encoded `ImProtoResponse` frame
/// ready to hand to the session table's broadcast.
#[async_trait]
pub trait LocalFanOut: Send + Sync {
    /// True iff `user_id` has at least one active session on this node.
    async fn is_online_local(&self, user_id: &str) -> bool;

    /// Fan out `bytes` to every active session of `user_id`. Returns the
    /// number of sessions it was actually sent to.
    async fn broadcast_to_user(&self, user_id: &str, bytes: &[u8]) -> usize;

    /// Handle a forwarded `TransferC2CMsg` call: decode the recipient out
    /// of `request`, re-check local presence (defense against a stale
    /// route) and fan out locally. Unlike the other methods, this one
    /// owns recipient resolution, since it is only discoverable by
    /// decoding the opaque payload — something only the router layer
    /// knows how to do.
    async fn handle_transfer(&self, request: ImProtoRequest) -> WebBaseResponse;
}

/// `MessageService` server implementation.
///
/// The receive side of `TransferC2CMsg` deliberately does not re-publish
/// to the durable bus — the origin node already did that before
/// forwarding — it only re-checks local presence (defense against a stale
/// route) and fans out locally.
pub struct MessageServiceImpl {
    fan_out: std::sync::Arc<dyn LocalFanOut>,
}

impl MessageServiceImpl {
    /// Build a handler delegating local fan-out to `fan_out`.
    #[must_use]
    pub fn new(fan_out: std::sync::Arc<dyn LocalFanOut>) -> Self {
        Self { fan_out }
    }

    async fn deliver_to(&self, to_user: &str, bytes: &[u8]) -> WebBaseResponse {
        if to_user.is_empty() {
            return internal("malformed push: empty to_user");
        }
        if !self.fan_out.is_online_local(to_user).await {
            return not_found(format!("{to_user} has no local session on this node"));
        }
        let sent = self.fan_out.broadcast_to_user(to_user, bytes).await;
        if sent == 0 {
            not_found(format!("{to_user} had sessions but all sends failed"))
        } else {
            ok()
        }
    }
}

#[tonic::async_trait]
impl MessageService for MessageServiceImpl {
    async fn transfer_c2c_msg(
        &self,
        request: Request<ImProtoRequest>,
    ) -> Result<Response<WebBaseResponse>, Status> {
        let resp = self.fan_out.handle_transfer(request.into_inner()).await;
        Ok(Response::new(resp))
    }

    async fn response_server_ack2_client(
        &self,
        request: Request<ServerAckPush>,
    ) -> Result<Response<WebBaseResponse>, Status> {
        let req = request.into_inner();
        let resp = self.deliver_to(&req.to_user, req.client_msg_id.as_bytes()).await;
        Ok(Response::new(resp))
    }

    async fn response_client_ack2_client(
        &self,
        request: Request<ClientAckPush>,
    ) -> Result<Response<WebBaseResponse>, Status> {
        let req = request.into_inner();
        let resp = self.deliver_to(&req.to_user, req.client_msg_id.as_bytes()).await;
        Ok(Response::new(resp))
    }

    async fn send_withdraw_msg2_client(
        &self,
        request: Request<WithdrawPush>,
    ) -> Result<Response<WebBaseResponse>, Status> {
        let req = request.into_inner();
        let resp = self.deliver_to(&req.to_user, &req.server_msg_id.to_le_bytes()).await;
        Ok(Response::new(resp))
    }

    async fn push_friend_request2_client(
        &self,
        request: Request<FriendRequestPush>,
    ) -> Result<Response<WebBaseResponse>, Status> {
        let req = request.into_inner();
        let resp = self.deliver_to(&req.to_user, &req.payload).await;
        Ok(Response::new(resp))
    }

    async fn push_friend_response2_client(
        &self,
        request: Request<FriendResponsePush>,
    ) -> Result<Response<WebBaseResponse>, Status> {
        let req = request.into_inner();
        let resp = self.deliver_to(&req.to_user, &req.payload).await;
        Ok(Response::new(resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct StubFanOut {
        online: bool,
        sent: usize,
    }

    #[async_trait]
    impl LocalFanOut for StubFanOut {
        async fn is_online_local(&self, _user_id: &str) -> bool {
            self.online
        }
        async fn broadcast_to_user(&self, _user_id: &str, _bytes: &[u8]) -> usize {
            self.sent
        }
        async fn handle_transfer(&self, _request: ImProtoRequest) -> WebBaseResponse {
            if self.online {
                ok()
            } else {
                not_found("offline")
            }
        }
    }

    #[tokio::test]
    async fn offline_recipient_returns_not_found() {
        let svc = MessageServiceImpl::new(Arc::new(StubFanOut { online: false, sent: 0 }));
        let resp = svc
            .response_server_ack2_client(Request::new(ServerAckPush {
                server_msg_id: 1,
                client_msg_id: "c1".to_string(),
                to_user: "bob".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.code, CODE_NOT_FOUND);
    }

    #[tokio::test]
    async fn online_recipient_with_successful_send_returns_ok() {
        let svc = MessageServiceImpl::new(Arc::new(StubFanOut { online: true, sent: 1 }));
        let resp = svc
            .response_server_ack2_client(Request::new(ServerAckPush {
                server_msg_id: 1,
                client_msg_id: "c1".to_string(),
                to_user: "bob".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.code, CODE_SUCCESS);
    }
}
