//! Cross-field validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ImGateConfig, StorageBackend};

/// Validate the cross-field invariants the spec calls out. Rejects:
/// - `idle_state_check_interval >= heartbeat_timeout`
/// - `len(retry.delays) != retry.max_retries`
/// - `storage.backend == Redis` with an empty `storage.redis_url`
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] describing the first violated
/// invariant.
pub fn validate(config: &ImGateConfig) -> ConfigResult<()> {
    let idle_check = config.netty.derived_idle_check_interval_secs();
    if idle_check >= config.netty.heartbeat_timeout_secs {
        return Err(ConfigError::Invalid(format!(
            "netty.idle_state_check_interval ({idle_check}s) must be < netty.heartbeat_timeout ({}s)",
            config.netty.heartbeat_timeout_secs
        )));
    }

    if config.retry.enabled
        && config.retry.delays.len() != config.retry.max_retries as usize
    {
        return Err(ConfigError::Invalid(format!(
            "retry.delays has {} entries but retry.max_retries is {}",
            config.retry.delays.len(),
            config.retry.max_retries
        )));
    }

    if config.storage.backend == StorageBackend::Redis && config.storage.redis_url.is_empty() {
        return Err(ConfigError::Invalid(
            "storage.backend is redis but storage.redis_url is empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&ImGateConfig::default()).is_ok());
    }

    #[test]
    fn rejects_idle_check_not_less_than_heartbeat_timeout() {
        let mut config = ImGateConfig::default();
        config.netty.heartbeat_timeout_secs = 10;
        config.netty.idle_state_check_interval_secs = 10;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_mismatched_retry_delays_length() {
        let mut config = ImGateConfig::default();
        config.retry.max_retries = 3;
        config.retry.delays = vec![1, 2];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn ignores_retry_delays_length_when_retry_disabled() {
        let mut config = ImGateConfig::default();
        config.retry.enabled = false;
        config.retry.max_retries = 3;
        config.retry.delays = vec![1, 2];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_redis_backend_without_a_url() {
        let mut config = ImGateConfig::default();
        config.storage.backend = StorageBackend::Redis;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn accepts_redis_backend_with_a_url() {
        let mut config = ImGateConfig::default();
        config.storage.backend = StorageBackend::Redis;
        config.storage.redis_url = "redis://127.0.0.1:6379/0".to_string();
        assert!(validate(&config).is_ok());
    }
}
