//! The per-message-type strategy registry the dispatcher routes into.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use imgate_core::msg::{ImProtoRequest, ImProtoResponse, MsgType};
use imgate_session::Session;

/// One routable message-type handler.
///
/// The dispatcher never mutates the session table and never performs
/// network I/O on unrelated sessions directly — implementations do that,
/// e.g. by delegating to the delivery router.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Handle `request`, received on `session`.
    async fn handle(&self, session: &Arc<Session>, request: ImProtoRequest) -> ImProtoResponse;
}

/// Maps [`MsgType`] to its registered [`Strategy`].
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<MsgType, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` for `msg_type`, replacing any prior registration.
    pub fn register(&mut self, msg_type: MsgType, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(msg_type, strategy);
    }

    /// Look up the strategy for `msg_type`.
    #[must_use]
    pub fn get(&self, msg_type: MsgType) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(&msg_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoStrategy;

    #[async_trait]
    impl Strategy for EchoStrategy {
        async fn handle(&self, _session: &Arc<Session>, request: ImProtoRequest) -> ImProtoResponse {
            ImProtoResponse::ok(MsgType::Heartbeat, request.payload)
        }
    }

    #[test]
    fn registry_returns_none_for_unregistered_type() {
        let registry = StrategyRegistry::new();
        assert!(registry.get(MsgType::C2cSend).is_none());
    }

    #[test]
    fn registry_round_trips_a_registration() {
        let mut registry = StrategyRegistry::new();
        registry.register(MsgType::Heartbeat, Arc::new(EchoStrategy));
        assert!(registry.get(MsgType::Heartbeat).is_some());
    }
}
