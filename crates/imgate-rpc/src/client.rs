//! Pooled `MessageService` client, one connection per peer endpoint.

use std::time::Duration;

use dashmap::DashMap;
use tonic::transport::Channel;
use tonic::Request;
use tracing::warn;

use crate::error::{RpcError, RpcResult};
use crate::generated::message_service_client::MessageServiceClient;
use crate::generated::{
    ClientAckPush, FriendRequestPush, FriendResponsePush, ImProtoRequest, ServerAckPush,
    WebBaseResponse, WithdrawPush,
};

/// Deadline applied to every peer RPC call.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// A concurrent map of pooled clients, keyed by `host:port`.
///
/// Creation is double-checked: a missing entry is built and inserted only
/// once even under concurrent callers, via `dashmap`'s entry API. A call
/// that fails marks its client for removal so the next call re-dials
/// rather than retrying a connection that is known bad.
pub struct RpcClientPool {
    clients: DashMap<String, MessageServiceClient<Channel>>,
}

impl Default for RpcClientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcClientPool {
    /// Build an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self { clients: DashMap::new() }
    }

    async fn client_for(&self, endpoint: &str) -> RpcResult<MessageServiceClient<Channel>> {
        if let Some(client) = self.clients.get(endpoint) {
            return Ok(client.clone());
        }

        let channel = Channel::from_shared(format!("http://{endpoint}"))
            .map_err(|e| RpcError::Dial { endpoint: endpoint.to_string(), source: e.into() })?
            .connect()
            .await
            .map_err(|e| RpcError::Dial { endpoint: endpoint.to_string(), source: e })?;
        let client = MessageServiceClient::new(channel);

        // entry() re-checks under the shard lock, so a concurrent dialer
        // loses gracefully rather than creating a duplicate channel.
        let client = self
            .clients
            .entry(endpoint.to_string())
            .or_insert(client)
            .clone();
        Ok(client)
    }

    fn evict(&self, endpoint: &str) {
        self.clients.remove(endpoint);
    }

    fn deadline_request<T>(message: T) -> Request<T> {
        let mut request = Request::new(message);
        request.set_timeout(DEFAULT_DEADLINE);
        request
    }

    async fn call<T, F, Fut>(&self, endpoint: &str, message: T, f: F) -> RpcResult<WebBaseResponse>
    where
        F: FnOnce(MessageServiceClient<Channel>, Request<T>) -> Fut,
        Fut: std::future::Future<Output = Result<tonic::Response<WebBaseResponse>, tonic::Status>>,
    {
        let client = self.client_for(endpoint).await?;
        let request = Self::deadline_request(message);
        match f(client, request).await {
            Ok(response) => Ok(response.into_inner()),
            Err(status) => {
                warn!(endpoint, error = %status, "peer rpc call failed, evicting pooled client");
                self.evict(endpoint);
                Err(RpcError::Status(status))
            }
        }
    }

    /// Forward a send to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Dial`]/[`RpcError::Status`] on transport
    /// failure.
    pub async fn transfer_c2c_msg(
        &self,
        endpoint: &str,
        request: ImProtoRequest,
    ) -> RpcResult<WebBaseResponse> {
        self.call(endpoint, request, |mut c, r| async move { c.transfer_c2c_msg(r).await }).await
    }

    /// Forward a server-ack push to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Dial`]/[`RpcError::Status`] on transport
    /// failure.
    pub async fn response_server_ack_2_client(
        &self,
        endpoint: &str,
        request: ServerAckPush,
    ) -> RpcResult<WebBaseResponse> {
        self.call(endpoint, request, |mut c, r| async move {
            c.response_server_ack2_client(r).await
        })
        .await
    }

    /// Forward a client-ack push to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Dial`]/[`RpcError::Status`] on transport
    /// failure.
    pub async fn response_client_ack_2_client(
        &self,
        endpoint: &str,
        request: ClientAckPush,
    ) -> RpcResult<WebBaseResponse> {
        self.call(endpoint, request, |mut c, r| async move {
            c.response_client_ack2_client(r).await
        })
        .await
    }

    /// Forward a withdraw push to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Dial`]/[`RpcError::Status`] on transport
    /// failure.
    pub async fn send_withdraw_msg_2_client(
        &self,
        endpoint: &str,
        request: WithdrawPush,
    ) -> RpcResult<WebBaseResponse> {
        self.call(endpoint, request, |mut c, r| async move { c.send_withdraw_msg2_client(r).await })
            .await
    }

    /// Forward a friend-request push to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Dial`]/[`RpcError::Status`] on transport
    /// failure.
    pub async fn push_friend_request_2_client(
        &self,
        endpoint: &str,
        request: FriendRequestPush,
    ) -> RpcResult<WebBaseResponse> {
        self.call(endpoint, request, |mut c, r| async move {
            c.push_friend_request2_client(r).await
        })
        .await
    }

    /// Forward a friend-response push to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Dial`]/[`RpcError::Status`] on transport
    /// failure.
    pub async fn push_friend_response_2_client(
        &self,
        endpoint: &str,
        request: FriendResponsePush,
    ) -> RpcResult<WebBaseResponse> {
        self.call(endpoint, request, |mut c, r| async move {
            c.push_friend_response2_client(r).await
        })
        .await
    }
}
