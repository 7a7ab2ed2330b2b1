//! Frame acceptance, the bounded work queue, and the worker pool that
//! drains it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use imgate_core::msg::{ImProtoRequest, ImProtoResponse, MsgType, ProtoResponseCode};
use imgate_session::Session;
use prost::Message as _;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::pool::TaskPool;
use crate::strategy::StrategyRegistry;

/// Default per-worker-channel queue depth. The dispatcher splits its
/// total capacity across `worker_count` channels, one per worker, so each
/// long-lived worker owns its own receiver rather than contending on a
/// single shared one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// A task older than this at dequeue is discarded as stale rather than
/// processed — the client has likely already moved on.
pub const STALE_AFTER: Duration = Duration::from_secs(30);

/// Counters exposed for diagnostics.
#[derive(Default)]
pub struct DispatcherCounters {
    /// Frames dropped because every worker's queue was full.
    pub dropped: AtomicU64,
    /// Tasks discarded at dequeue for being older than [`STALE_AFTER`].
    pub stale_discarded: AtomicU64,
}

/// Parses inbound frames, routes them by [`MsgType`] to a registered
/// strategy, and executes them on a bounded worker pool.
///
/// Backpressure is explicit and lossy by design: `accept_frame` never
/// blocks the transport reader. When a worker's queue is full the frame
/// is dropped and `counters.dropped` is incremented; callers (at the
/// transport/ack layer) are expected to retry.
pub struct MessageDispatcher {
    senders: Vec<mpsc::Sender<Box<crate::pool::Task>>>,
    next_worker: AtomicUsize,
    pool: Arc<TaskPool>,
    pub counters: Arc<DispatcherCounters>,
}

impl MessageDispatcher {
    /// Spawn `worker_count` workers, each routing through `registry`, and
    /// return the dispatcher handle used to feed them.
    #[must_use]
    pub fn spawn(
        worker_count: usize,
        queue_capacity: usize,
        registry: Arc<StrategyRegistry>,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let per_worker_capacity = (queue_capacity / worker_count).max(1);
        let pool = Arc::new(TaskPool::new(queue_capacity));
        let counters = Arc::new(DispatcherCounters::default());

        let mut senders = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let (tx, rx) = mpsc::channel(per_worker_capacity);
            senders.push(tx);
            let registry = Arc::clone(&registry);
            let pool = Arc::clone(&pool);
            let counters = Arc::clone(&counters);
            tokio::spawn(worker_loop(worker_id, rx, registry, pool, counters));
        }

        Self { senders, next_worker: AtomicUsize::new(0), pool, counters }
    }

    /// Accept one inbound frame from `session`.
    ///
    /// Advances `session.last_activity_time`; parsing and routing happen
    /// on the worker, not here, so this call never blocks on strategy
    /// execution.
    pub async fn accept_frame(&self, session: Arc<Session>, bytes: Vec<u8>) {
        session.record_activity();

        let worker = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        let task = self.pool.acquire(session, bytes);

        if let Err(mpsc::error::TrySendError::Full(task) | mpsc::error::TrySendError::Closed(task)) =
            self.senders[worker].try_send(task)
        {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            self.pool.release(task);
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<Box<crate::pool::Task>>,
    registry: Arc<StrategyRegistry>,
    pool: Arc<TaskPool>,
    counters: Arc<DispatcherCounters>,
) {
    while let Some(task) = rx.recv().await {
        let stale = task
            .received_at
            .map(|at| at.elapsed() > STALE_AFTER)
            .unwrap_or(false);

        if stale {
            counters.stale_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(worker_id, "discarding stale task");
            pool.release(task);
            continue;
        }

        let Some(session) = task.session.clone() else {
            pool.release(task);
            continue;
        };
        let bytes = task.bytes.clone();
        pool.release(task);

        let response = route_and_handle(&registry, &session, &bytes).await;
        if let Some(response) = response {
            if let Err(e) = session.send(encode(&response)).await {
                warn!(worker_id, error = %e, "failed to send response frame");
            }
        }
    }
    debug!(worker_id, "dispatcher worker exiting, channel closed");
}

async fn route_and_handle(
    registry: &StrategyRegistry,
    session: &Arc<Session>,
    bytes: &[u8],
) -> Option<ImProtoResponse> {
    let request = match decode(bytes) {
        Some(r) => r,
        None => {
            return Some(ImProtoResponse::error(
                MsgType::Heartbeat,
                ProtoResponseCode::InvalidRequest,
                "malformed frame",
            ));
        }
    };

    let Some(msg_type) = MsgType::from_u32(request.msg_type) else {
        return Some(ImProtoResponse::error(
            MsgType::Heartbeat,
            ProtoResponseCode::InvalidRequest,
            format!("unrecognized msg_type {}", request.msg_type),
        ));
    };

    let Some(strategy) = registry.get(msg_type) else {
        return Some(ImProtoResponse::error(
            msg_type,
            ProtoResponseCode::InvalidRequest,
            "no strategy registered for this msg_type",
        ));
    };

    Some(strategy.handle(session, request).await)
}

fn decode(bytes: &[u8]) -> Option<ImProtoRequest> {
    ImProtoRequest::decode(bytes).ok()
}

fn encode(response: &ImProtoResponse) -> Vec<u8> {
    response.encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use imgate_session::SessionTransport;
    use std::sync::atomic::{AtomicBool, AtomicUsize as StdAtomicUsize};
    use std::sync::Mutex;

    struct RecordingTransport {
        closed: AtomicBool,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl SessionTransport for RecordingTransport {
        async fn send(&self, frame: Vec<u8>) -> Result<(), String> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }
        async fn ping(&self) -> Result<(), String> {
            Ok(())
        }
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct CountingStrategy {
        calls: Arc<StdAtomicUsize>,
    }

    #[async_trait]
    impl crate::strategy::Strategy for CountingStrategy {
        async fn handle(&self, _session: &Arc<Session>, request: ImProtoRequest) -> ImProtoResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ImProtoResponse::ok(MsgType::Heartbeat, request.payload)
        }
    }

    fn session_with_recorder() -> (Arc<Session>, Arc<Mutex<Vec<Vec<u8>>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport =
            Arc::new(RecordingTransport { closed: AtomicBool::new(false), sent: Arc::clone(&sent) });
        let session = Arc::new(Session::new(
            "s1".to_string(),
            "u1".to_string(),
            "127.0.0.1:1".to_string(),
            transport,
        ));
        (session, sent)
    }

    #[tokio::test]
    async fn accept_frame_routes_to_registered_strategy() {
        let calls = Arc::new(StdAtomicUsize::new(0));
        let mut registry = StrategyRegistry::new();
        registry.register(MsgType::Heartbeat, Arc::new(CountingStrategy { calls: Arc::clone(&calls) }));

        let dispatcher = MessageDispatcher::spawn(2, 16, Arc::new(registry));
        let (session, sent) = session_with_recorder();

        let request = ImProtoRequest { msg_type: MsgType::Heartbeat as u32, payload: vec![] };
        dispatcher.accept_frame(session, request.encode_to_vec()).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unroutable_type_gets_an_error_response() {
        let registry = StrategyRegistry::new();
        let dispatcher = MessageDispatcher::spawn(1, 16, Arc::new(registry));
        let (session, sent) = session_with_recorder();

        let request = ImProtoRequest { msg_type: MsgType::C2cSend as u32, payload: vec![] };
        dispatcher.accept_frame(session, request.encode_to_vec()).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let frames = sent.lock().unwrap();
        assert_eq!(frames.len(), 1);
        let response = ImProtoResponse::decode(frames[0].as_slice()).unwrap();
        assert_eq!(response.code, ProtoResponseCode::InvalidRequest as u32);
    }

    #[tokio::test]
    async fn malformed_frame_gets_an_error_response() {
        let registry = StrategyRegistry::new();
        let dispatcher = MessageDispatcher::spawn(1, 16, Arc::new(registry));
        let (session, sent) = session_with_recorder();

        dispatcher.accept_frame(session, b"not a valid protobuf frame".to_vec()).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sent.lock().unwrap().len(), 1);
    }
}
