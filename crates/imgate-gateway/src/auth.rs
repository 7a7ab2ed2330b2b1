//! Accept-time authentication: bearer JWT claims, the stress-test back
//! door, and local consecutive-failure IP blocking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use imgate_config::{AuthConfig, ImGateConfig};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// Claims carried by a validated bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Authenticated user id.
    pub user_id: String,
    /// Display username, informational only.
    #[serde(default)]
    pub username: String,
    /// Expiry, seconds since Unix epoch (validated by `jsonwebtoken`).
    pub exp: u64,
}

/// Credentials as extracted from request headers or query parameters,
/// before validation.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// `Authorization: Bearer <token>` or `?token=`.
    pub token: Option<String>,
    /// `uid` header/query param, only meaningful for the stress-test
    /// back door.
    pub uid: Option<String>,
}

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was presented at all.
    #[error("no credentials presented")]
    Missing,
    /// The bearer token failed signature or expiry validation.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    /// This IP has exceeded the consecutive-failure threshold.
    #[error("ip blocked after too many consecutive auth failures")]
    IpBlocked,
}

struct FailureEntry {
    count: u32,
    last_failure: Instant,
}

/// Validates accept-time credentials per [`AuthConfig`], reading policy
/// fresh from the config watch channel on every call. Consecutive
/// failures are tracked per IP in-process, not shared across nodes, per
/// this gateway's scope.
pub struct Authenticator {
    config: watch::Receiver<Arc<ImGateConfig>>,
    failures: Mutex<HashMap<String, FailureEntry>>,
}

impl Authenticator {
    /// Build an authenticator, reading `config.auth` on every call.
    #[must_use]
    pub fn new(config: watch::Receiver<Arc<ImGateConfig>>) -> Self {
        Self { config, failures: Mutex::new(HashMap::new()) }
    }

    fn current(&self) -> AuthConfig {
        self.config.borrow().auth.clone()
    }

    /// Validate `credentials` from `remote_ip`, recording the outcome
    /// against that IP's consecutive-failure counter.
    pub fn authenticate(&self, remote_ip: &str, credentials: &Credentials) -> Result<Claims, AuthError> {
        let config = self.current();

        if self.is_blocked(remote_ip, &config) {
            return Err(AuthError::IpBlocked);
        }

        if !config.enabled {
            return Ok(Claims {
                user_id: credentials.uid.clone().unwrap_or_default(),
                username: String::new(),
                exp: u64::MAX,
            });
        }

        let result = self.try_authenticate(credentials, &config);
        match &result {
            Ok(claims) => {
                self.clear_failures(remote_ip);
                info!(user_id = %claims.user_id, remote_ip, "accept authenticated");
            }
            Err(e) => {
                self.record_failure(remote_ip);
                warn!(remote_ip, error = %e, "accept auth failed");
            }
        }
        result
    }

    fn try_authenticate(&self, credentials: &Credentials, config: &AuthConfig) -> Result<Claims, AuthError> {
        // Stress-test back door: consulted before the normal bearer path,
        // only when explicitly enabled.
        if config.stress_test_enabled {
            if let (Some(token), Some(uid)) = (&credentials.token, &credentials.uid) {
                if *token == config.stress_test_token {
                    return Ok(Claims { user_id: uid.clone(), username: String::new(), exp: u64::MAX });
                }
            }
        }

        let token = credentials.token.as_deref().ok_or(AuthError::Missing)?;
        let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let data = decode::<Claims>(token, &key, &Validation::default())?;
        Ok(data.claims)
    }

    fn is_blocked(&self, ip: &str, config: &AuthConfig) -> bool {
        let failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.get(ip).is_some_and(|entry| entry.count >= config.max_consecutive_failures)
    }

    fn record_failure(&self, ip: &str) {
        let ttl = Duration::from_secs(self.current().failure_block_ttl_secs);
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let entry = failures.entry(ip.to_string()).or_insert(FailureEntry { count: 0, last_failure: Instant::now() });
        if entry.last_failure.elapsed() > ttl {
            entry.count = 0;
        }
        entry.count += 1;
        entry.last_failure = Instant::now();
    }

    fn clear_failures(&self, ip: &str) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        failures.remove(ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator(stress_test: bool) -> Authenticator {
        let mut config = ImGateConfig::default();
        config.auth = AuthConfig {
            enabled: true,
            jwt_secret: "test-secret".to_string(),
            stress_test_enabled: stress_test,
            stress_test_token: "stress-token".to_string(),
            max_consecutive_failures: 3,
            failure_block_ttl_secs: 300,
        };
        let (_tx, rx) = watch::channel(Arc::new(config));
        Authenticator::new(rx)
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let auth = authenticator(false);
        let result = auth.authenticate("1.2.3.4", &Credentials::default());
        assert!(matches!(result, Err(AuthError::Missing)));
    }

    #[test]
    fn stress_test_backdoor_accepts_fixed_token_and_uid() {
        let auth = authenticator(true);
        let creds = Credentials { token: Some("stress-token".to_string()), uid: Some("u1".to_string()) };
        let claims = auth.authenticate("1.2.3.4", &creds).unwrap();
        assert_eq!(claims.user_id, "u1");
    }

    #[test]
    fn stress_test_backdoor_is_ignored_when_disabled() {
        let auth = authenticator(false);
        let creds = Credentials { token: Some("stress-token".to_string()), uid: Some("u1".to_string()) };
        assert!(auth.authenticate("1.2.3.4", &creds).is_err());
    }

    #[test]
    fn ip_is_blocked_after_threshold_consecutive_failures() {
        let auth = authenticator(false);
        for _ in 0..3 {
            let _ = auth.authenticate("1.2.3.4", &Credentials::default());
        }
        let result = auth.authenticate("1.2.3.4", &Credentials::default());
        assert!(matches!(result, Err(AuthError::IpBlocked)));
    }

    #[test]
    fn success_clears_the_failure_counter() {
        let auth = authenticator(true);
        let _ = auth.authenticate("1.2.3.4", &Credentials::default());
        let creds = Credentials { token: Some("stress-token".to_string()), uid: Some("u1".to_string()) };
        assert!(auth.authenticate("1.2.3.4", &creds).is_ok());
        assert!(!auth.is_blocked("1.2.3.4", &auth.current()));
    }
}
