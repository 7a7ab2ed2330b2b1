//! Wires every subsystem together: session table, liveness controller,
//! dispatcher, delivery router, retry engine, peer RPC server and the
//! client-facing accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use imgate_config::ImGateConfig;
use imgate_core::msg::MsgType;
use imgate_core::Snowflake;
use imgate_dispatcher::{MessageDispatcher, StrategyRegistry, DEFAULT_QUEUE_CAPACITY};
use imgate_retry::{RetryConfig as EngineRetryConfig, RetryEngine};
use imgate_router::{
    AckStrategy, BatchStrategy, DispatchContext, NoopBatchMsgIdSource, SendStrategy,
    SessionTableFanOut, WithdrawStrategy,
};
use imgate_rpc::generated::message_service_server::MessageServiceServer;
use imgate_rpc::{MessageServiceImpl, RpcClientPool};
use imgate_session::{LivenessConfig, LivenessController, Session, SessionTable};
use imgate_storage::{AdmissionCounters, DurableBus, KvStore, PresenceDirectory, RetryStore};
use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use crate::admission::AdmissionControl;
use crate::auth::{Authenticator, Credentials};
use crate::error::{GatewayError, GatewayResult};
use crate::transport::WsTransport;

/// Everything a client connection handler needs, cloned per-connection
/// via `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub(crate) sessions: Arc<SessionTable>,
    pub(crate) dispatcher: Arc<MessageDispatcher>,
    pub(crate) auth: Arc<Authenticator>,
    pub(crate) admission: Arc<AdmissionControl>,
}

/// Everything built and kept alive for the lifetime of the process, plus
/// the components needed to drive a graceful shutdown.
pub struct Gateway {
    pub(crate) state: AppState,
    pub(crate) config: Arc<ImGateConfig>,
    pub(crate) liveness: LivenessController,
    pub(crate) retry_engine: Arc<RetryEngine>,
    pub(crate) rpc_server: MessageServiceServer<MessageServiceImpl>,
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

/// Build every subsystem from the current value of `config_rx`, backed by
/// `kv` and `bus`.
///
/// Admission limits and auth policy are read fresh from `config_rx` on
/// every connection/frame, so a hot-reloaded config takes effect
/// immediately. The dispatcher worker count, liveness cadence and retry
/// schedule are baked in at this snapshot — changing those requires a
/// restart, since they size already-spawned workers and tickers.
///
/// `datacenter_id`/`machine_id` seed the snowflake id generator; callers
/// typically source these from deployment topology (e.g. a pod ordinal).
pub fn build(
    config_rx: watch::Receiver<Arc<ImGateConfig>>,
    kv: Arc<dyn KvStore>,
    bus: Arc<dyn DurableBus>,
    datacenter_id: u16,
    machine_id: u16,
) -> GatewayResult<Gateway> {
    let config = config_rx.borrow().clone();
    Snowflake::init_global(datacenter_id, machine_id)?;

    let sessions = Arc::new(SessionTable::new(config.sessions.max_sessions_per_user, config.server.max_connections as u64));
    let presence = Arc::new(PresenceDirectory::new(Arc::clone(&kv)));
    let rpc_pool = Arc::new(RpcClientPool::new());
    let retry_store = Arc::new(RetryStore::new(Arc::clone(&kv)));
    let admission_counters = Arc::new(AdmissionCounters::new(Arc::clone(&kv)));

    let dispatch_ctx = Arc::new(DispatchContext {
        sessions: Arc::clone(&sessions),
        presence: Arc::clone(&presence),
        rpc: Arc::clone(&rpc_pool),
        bus: Arc::clone(&bus),
    });

    let retry_delays = config.retry.delays.clone();
    let mut registry = StrategyRegistry::new();
    registry.register(
        MsgType::C2cSend,
        Arc::new(SendStrategy::new(Arc::clone(&dispatch_ctx), Arc::clone(&retry_store), retry_delays, config.retry.max_retries)),
    );
    registry.register(MsgType::C2cAck, Arc::new(AckStrategy::new(Arc::clone(&dispatch_ctx), Arc::clone(&retry_store))));
    registry.register(
        MsgType::WithdrawMsgSend,
        Arc::new(WithdrawStrategy::new(Arc::clone(&dispatch_ctx), Arc::clone(&retry_store))),
    );
    registry.register(MsgType::GetBatchMsgIds, Arc::new(BatchStrategy::new(Arc::new(NoopBatchMsgIdSource))));

    let dispatcher = Arc::new(MessageDispatcher::spawn(config.netty.worker_threads, DEFAULT_QUEUE_CAPACITY, Arc::new(registry)));

    let liveness_config = LivenessConfig::new(
        Duration::from_secs(config.netty.heartbeat_timeout_secs),
        Duration::from_secs(config.netty.derived_idle_check_interval_secs()),
        config.netty.max_heartbeat_failures,
    );
    let (shutdown_tx, shutdown_rx1) = broadcast::channel(1);
    let liveness = LivenessController::new(Arc::clone(&sessions), liveness_config, shutdown_rx1);

    let retry_engine_config = EngineRetryConfig {
        max_retries: config.retry.max_retries,
        retry_delays_secs: config.retry.delays.clone(),
        batch_size: config.retry.batch_size,
        scan_interval: Duration::from_secs(config.retry.scan_interval_secs),
    };
    let retry_engine = Arc::new(RetryEngine::new(Arc::clone(&retry_store), Arc::clone(&sessions), Arc::clone(&bus), retry_engine_config)?);

    let fan_out = Arc::new(SessionTableFanOut::new(Arc::clone(&sessions)));
    let rpc_server = MessageServiceServer::new(MessageServiceImpl::new(fan_out));

    let admission = Arc::new(AdmissionControl::new(admission_counters, config_rx.clone()));
    let auth = Arc::new(Authenticator::new(config_rx));

    let state = AppState { sessions, dispatcher, auth, admission };

    Ok(Gateway { state, config, liveness, retry_engine, rpc_server, shutdown_tx })
}

impl Gateway {
    /// Run the liveness controller, retry engine and accept loop until a
    /// shutdown signal arrives, then drain in dependency order: stop
    /// accepting, stop the background scanners, let in-flight dispatcher
    /// work finish, close sessions, release storage.
    pub async fn run(self, addr: SocketAddr, rpc_addr: SocketAddr) -> GatewayResult<()> {
        let shutdown_rx_retry = self.shutdown_tx.subscribe();

        let liveness = self.liveness;
        let liveness_task = tokio::spawn(async move { liveness.run().await });
        let retry_engine = Arc::clone(&self.retry_engine);
        let retry_task = tokio::spawn(async move { retry_engine.run(shutdown_rx_retry).await });

        let rpc_server = self.rpc_server.clone();
        let rpc_shutdown = self.shutdown_tx.subscribe();
        let rpc_task = tokio::spawn(async move {
            let mut rpc_shutdown = rpc_shutdown;
            let result = tonic::transport::Server::builder()
                .add_service(rpc_server)
                .serve_with_shutdown(rpc_addr, async move {
                    let _ = rpc_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "peer rpc server exited with an error");
            }
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone());

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| GatewayError::Bind { addr, source: e })?;
        info!(%addr, %rpc_addr, "gateway accepting connections");

        let mut shutdown_rx_accept = self.shutdown_tx.subscribe();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx_accept.recv().await;
            })
            .await
            .map_err(|e| GatewayError::Serve { addr, source: e })?;

        info!("accept loop stopped, signaling background scanners");
        let _ = self.shutdown_tx.send(());

        let _ = liveness_task.await;
        let _ = retry_task.await;
        let _ = rpc_task.await;

        info!("draining dispatcher queue");
        tokio::time::sleep(Duration::from_secs(2)).await;

        info!("closing remaining sessions");
        for user_id in self.state.sessions.all_user_ids().await {
            for session in self.state.sessions.take_all(&user_id).await {
                session.close().await;
            }
        }

        info!("gateway shutdown complete");
        Ok(())
    }

    /// Signal shutdown to every background task and the accept loop.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// A cloneable handle that can trigger shutdown after `self` has been
    /// moved into [`Gateway::run`].
    #[must_use]
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}

#[derive(Debug, Deserialize, Default)]
struct WsAuthParams {
    token: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(params): Query<WsAuthParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let ip = remote.ip().to_string();
    let credentials = Credentials { token: params.token, uid: params.user_id };

    let claims = match state.auth.authenticate(&ip, &credentials) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(ip, error = %e, "rejecting websocket upgrade");
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
    };

    if state.admission.admit_connection(&ip).await.is_err() {
        warn!(ip, "rejecting websocket upgrade: admission control");
        return axum::http::StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, ip, claims.user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, ip: String, user_id: String) {
    let (sink, mut stream) = socket.split();
    let transport = Arc::new(WsTransport::new(sink));
    let session_id = uuid::Uuid::new_v4().to_string();
    let session = Arc::new(Session::new(session_id.clone(), user_id.clone(), ip.clone(), transport));

    if let Err(e) = state.sessions.add(&user_id, Arc::clone(&session)).await {
        warn!(user_id, error = %e, "rejecting session: capacity exhausted");
        session.close().await;
        state.admission.release(&ip).await;
        return;
    }

    while let Some(message) = stream.next().await {
        let bytes = match message {
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                session.record_activity();
                continue;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(session_id, error = %e, "websocket read error");
                break;
            }
        };

        if state.admission.admit_frame(&ip, bytes.len()).await.is_err() {
            continue;
        }
        state.dispatcher.accept_frame(Arc::clone(&session), bytes).await;
    }

    state.sessions.remove(&user_id, &session_id).await;
    session.close().await;
    state.admission.release(&ip).await;
}
