//! Durable message bus: publishes [`ClusterEvent`]s to the `XZLL_C2CMSG_TOPIC`
//! topic for cross-node persistence and fan-out. Publish failures never
//! block delivery; callers fire-and-forget.

use async_trait::async_trait;
use imgate_core::model::ClusterEvent;
use tracing::warn;

use crate::error::StorageResult;

/// Topic every [`ClusterEvent`] is published to.
pub const TOPIC: &str = "XZLL_C2CMSG_TOPIC";

/// A durable publish target for cluster events.
///
/// The bus is asynchronous and best-effort from the gateway's perspective:
/// an implementation may retry internally, but `publish` returning `Err`
/// must never be treated as a delivery failure by callers — the event is
/// persistence/fan-out plumbing, not the delivery path itself.
#[async_trait]
pub trait DurableBus: Send + Sync {
    /// Publish an event, keyed by `key` (the `server_msg_id` as a decimal
    /// string, per the key schema).
    async fn publish(&self, key: &str, event: &ClusterEvent) -> StorageResult<()>;
}

/// A [`DurableBus`] that logs and drops every event. Used in tests and
/// single-node deployments where no bus is configured.
#[derive(Default)]
pub struct NoopBus;

#[async_trait]
impl DurableBus for NoopBus {
    async fn publish(&self, key: &str, event: &ClusterEvent) -> StorageResult<()> {
        tracing::trace!(key, ?event.cluster_event_type, "noop bus: dropping event");
        Ok(())
    }
}

/// Publish `event` to `bus`, logging and swallowing any error so a bus
/// outage never blocks the caller's delivery path.
pub async fn publish_best_effort(bus: &dyn DurableBus, key: &str, event: &ClusterEvent) {
    if let Err(e) = bus.publish(key, event).await {
        warn!(key, error = %e, "durable bus publish failed, continuing without it");
    }
}

#[cfg(feature = "kafka-backend")]
mod kafka {
    use std::time::Duration;

    use async_trait::async_trait;
    use imgate_core::model::ClusterEvent;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};

    use crate::error::{StorageError, StorageResult};

    use super::DurableBus;

    /// A [`DurableBus`] backed by a Kafka producer.
    pub struct KafkaBus {
        producer: FutureProducer,
        topic: String,
    }

    impl KafkaBus {
        /// Build a producer connected to `brokers` (comma-separated
        /// `host:port` list), publishing to `topic`.
        ///
        /// # Errors
        ///
        /// Returns [`StorageError::Bus`] if the producer cannot be built.
        pub fn new(brokers: &str, topic: impl Into<String>) -> StorageResult<Self> {
            let producer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()
                .map_err(|e| StorageError::Bus(e.to_string()))?;
            Ok(Self { producer, topic: topic.into() })
        }
    }

    #[async_trait]
    impl DurableBus for KafkaBus {
        async fn publish(&self, key: &str, event: &ClusterEvent) -> StorageResult<()> {
            let payload = serde_json::to_string(event)?;
            let record = FutureRecord::to(&self.topic).key(key).payload(&payload);
            self.producer
                .send(record, Duration::from_secs(0))
                .await
                .map_err(|(e, _)| StorageError::Bus(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(feature = "kafka-backend")]
pub use kafka::KafkaBus;

#[cfg(test)]
mod tests {
    use super::*;
    use imgate_core::model::ClusterEventType;
    use serde_json::json;

    #[tokio::test]
    async fn noop_bus_always_succeeds() {
        let bus = NoopBus;
        let event = ClusterEvent {
            cluster_event_type: ClusterEventType::C2cSend,
            data: json!({ "server_msg_id": 1 }),
        };
        bus.publish("1", &event).await.unwrap();
    }

    #[tokio::test]
    async fn publish_best_effort_swallows_errors() {
        struct FailingBus;
        #[async_trait]
        impl DurableBus for FailingBus {
            async fn publish(&self, _key: &str, _event: &ClusterEvent) -> StorageResult<()> {
                Err(crate::error::StorageError::Bus("down".to_string()))
            }
        }
        let event = ClusterEvent {
            cluster_event_type: ClusterEventType::C2cAck,
            data: json!({}),
        };
        publish_best_effort(&FailingBus, "1", &event).await;
    }
}
