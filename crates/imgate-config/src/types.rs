//! Typed configuration tree. Every field mirrors a key from the external
//! configuration table, with a `default_*()` function per field in the
//! teacher's style (`astrid_gateway::config`).

use serde::{Deserialize, Serialize};

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImGateConfig {
    /// Accept-side server settings.
    pub server: ServerConfig,
    /// Transport/liveness tuning (named `netty` after the source's
    /// transport library, preserved because it is the external config
    /// key name clients and deployment tooling already depend on).
    pub netty: NettyConfig,
    /// Authentication policy.
    pub auth: AuthConfig,
    /// Admission-control connection limiter.
    pub flow_control: FlowControlConfig,
    /// Admission-control security gates (IP blocking, global caps).
    pub security: SecurityConfig,
    /// Retry engine tuning.
    pub retry: RetryConfig,
    /// Session-table tuning.
    pub sessions: SessionLimits,
    /// Shared KV / durable bus backend selection.
    pub storage: StorageConfig,
}

impl Default for ImGateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            netty: NettyConfig::default(),
            auth: AuthConfig::default(),
            flow_control: FlowControlConfig::default(),
            security: SecurityConfig::default(),
            retry: RetryConfig::default(),
            sessions: SessionLimits::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Accept-side server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Accept port.
    pub port: u16,
    /// Global concurrent session cap.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

/// Transport / liveness tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NettyConfig {
    /// Dispatcher worker pool size.
    pub worker_threads: usize,
    /// Controller's active-probe cadence, seconds.
    pub ping_interval_secs: u64,
    /// Liveness timeout, seconds.
    pub heartbeat_timeout_secs: u64,
    /// Consecutive-failure close threshold.
    pub max_heartbeat_failures: u32,
    /// Liveness scan cadence, seconds. Must be `< heartbeat_timeout_secs`.
    pub idle_state_check_interval_secs: u64,
    /// Per-message hard size cap, bytes.
    pub max_message_size: usize,
}

impl Default for NettyConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            ping_interval_secs: default_ping_interval_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            max_heartbeat_failures: default_max_heartbeat_failures(),
            idle_state_check_interval_secs: default_idle_state_check_interval_secs(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl NettyConfig {
    /// The liveness scan cadence as computed by the spec when not
    /// explicitly overridden: `heartbeat_timeout / 3`.
    #[must_use]
    pub fn derived_idle_check_interval_secs(&self) -> u64 {
        if self.idle_state_check_interval_secs > 0 {
            self.idle_state_check_interval_secs
        } else {
            (self.heartbeat_timeout_secs / 3).max(1)
        }
    }
}

/// Authentication policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether credential validation is enforced at all.
    pub enabled: bool,
    /// HMAC-SHA256 shared secret used to validate bearer tokens.
    pub jwt_secret: String,
    /// Whether the stress-test back door is enabled.
    pub stress_test_enabled: bool,
    /// Fixed token accepted by the stress-test back door.
    pub stress_test_token: String,
    /// Consecutive auth failures from one IP before it is blocked.
    pub max_consecutive_failures: u32,
    /// How long a blocked IP's failure counter is remembered, seconds.
    pub failure_block_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jwt_secret: String::new(),
            stress_test_enabled: false,
            stress_test_token: String::new(),
            max_consecutive_failures: default_max_auth_failures(),
            failure_block_ttl_secs: default_failure_block_ttl_secs(),
        }
    }
}

/// Admission-control connection limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowControlConfig {
    /// Max messages per second, per IP.
    pub max_messages_per_sec: u32,
    /// Max bytes per second, per IP.
    pub max_bytes_per_sec: u64,
    /// Duration an IP stays throttled after a violation, seconds.
    pub throttle_duration_secs: u64,
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            max_messages_per_sec: default_max_messages_per_sec(),
            max_bytes_per_sec: default_max_bytes_per_sec(),
            throttle_duration_secs: default_throttle_duration_secs(),
        }
    }
}

/// Admission-control security gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Max concurrent connections per IP.
    pub max_conn_per_ip: u32,
    /// Max new connections per IP within a one-minute sliding window.
    pub max_new_conn_per_ip_per_min: u32,
    /// Explicitly blocked IPs, checked before any counter.
    pub blocked_ips: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_conn_per_ip: default_max_conn_per_ip(),
            max_new_conn_per_ip_per_min: default_max_new_conn_per_ip_per_min(),
            blocked_ips: Vec::new(),
        }
    }
}

/// Retry engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Whether the retry engine runs at all.
    pub enabled: bool,
    /// Maximum redeliveries before downgrade. Must equal `delays.len()`.
    pub max_retries: u32,
    /// Escalating delay schedule, seconds.
    pub delays: Vec<u64>,
    /// Max ready entries processed per scan tick.
    pub batch_size: usize,
    /// Scan loop cadence, seconds.
    pub scan_interval_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            delays: default_retry_delays(),
            batch_size: default_retry_batch_size(),
            scan_interval_secs: default_retry_scan_interval_secs(),
        }
    }
}

/// Session-table tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Max concurrent sessions per user on one node (`K`).
    pub max_sessions_per_user: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions_per_user: default_max_sessions_per_user(),
        }
    }
}

/// Which [`imgate_storage`]-equivalent backend the shared KV and durable
/// bus are built against. Single-node runs default to the in-memory
/// backends; a cluster deployment selects `Redis`/`Kafka` here instead of
/// the binary hardcoding one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process, single-node only. No cross-node presence or retry
    /// sharing is possible with this backend.
    Memory,
    /// Shared Redis instance, for the KV store (presence, retry, admission
    /// counters).
    Redis,
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::Memory
    }
}

/// Shared KV / durable bus backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend the shared KV store (presence, retry, admission
    /// counters) is built against.
    pub backend: StorageBackend,
    /// Redis connection URL, used when `backend == Redis`.
    pub redis_url: String,
    /// Whether the durable bus publishes to Kafka instead of being a noop.
    /// Independent of `backend`, since a single-node KV deployment may
    /// still want cross-node event fan-out disabled or enabled.
    pub kafka_enabled: bool,
    /// Comma-separated `host:port` broker list, used when `kafka_enabled`.
    pub kafka_brokers: String,
    /// Topic the durable bus publishes to, used when `kafka_enabled`.
    pub kafka_topic: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            redis_url: String::new(),
            kafka_enabled: false,
            kafka_brokers: String::new(),
            kafka_topic: default_kafka_topic(),
        }
    }
}

fn default_kafka_topic() -> String {
    "XZLL_C2CMSG_TOPIC".to_string()
}

fn default_port() -> u16 {
    8900
}
fn default_max_connections() -> usize {
    100_000
}
fn default_worker_threads() -> usize {
    16
}
fn default_ping_interval_secs() -> u64 {
    20
}
fn default_heartbeat_timeout_secs() -> u64 {
    60
}
fn default_max_heartbeat_failures() -> u32 {
    3
}
fn default_idle_state_check_interval_secs() -> u64 {
    20
}
fn default_max_message_size() -> usize {
    10_000
}
fn default_max_auth_failures() -> u32 {
    10
}
fn default_failure_block_ttl_secs() -> u64 {
    300
}
fn default_max_messages_per_sec() -> u32 {
    20
}
fn default_max_bytes_per_sec() -> u64 {
    1_000_000
}
fn default_throttle_duration_secs() -> u64 {
    60
}
fn default_max_conn_per_ip() -> u32 {
    50
}
fn default_max_new_conn_per_ip_per_min() -> u32 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delays() -> Vec<u64> {
    vec![5, 30, 300]
}
fn default_retry_batch_size() -> usize {
    10_000
}
fn default_retry_scan_interval_secs() -> u64 {
    1
}
fn default_max_sessions_per_user() -> usize {
    5
}
