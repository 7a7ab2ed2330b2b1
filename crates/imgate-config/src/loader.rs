//! Loading the config document and watching it for changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::types::ImGateConfig;
use crate::validate::validate;

/// Debounce window for coalescing bursty filesystem events on the config
/// file (editors commonly emit several events for one logical save).
const DEBOUNCE: Duration = Duration::from_millis(300);

impl ImGateConfig {
    /// Load and validate a config document from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if it fails cross-field validation.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = serde_yaml::from_str(&contents)?;
        validate(&config)?;
        Ok(config)
    }
}

/// A live, hot-reloading handle on the config document.
///
/// Holds the `notify` watcher alive for its lifetime — dropping it stops
/// filesystem monitoring. Subsystems observe updates through the
/// [`watch::Receiver`] returned by [`ConfigWatcher::start`]; an update that
/// fails validation is logged and discarded, preserving the last known
/// good config.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Load the config at `path`, then start watching it for changes.
    ///
    /// Returns the watcher (keep it alive) and a `tokio::sync::watch`
    /// receiver that always holds the most recently validated config,
    /// starting with the one loaded from disk.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`ImGateConfig::load`], plus
    /// [`ConfigError::Watch`] if the filesystem watcher cannot start.
    pub fn start(path: impl Into<PathBuf>) -> ConfigResult<(Self, watch::Receiver<Arc<ImGateConfig>>)> {
        let path = path.into();
        let initial = ImGateConfig::load(&path)?;
        let (tx, rx) = watch::channel(Arc::new(initial));

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| ConfigError::Watch(e.to_string()))?;

        let watch_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Watch(e.to_string()))?;

        let reload_path = path.clone();
        tokio::spawn(async move {
            let mut pending = false;
            loop {
                tokio::select! {
                    biased;

                    () = tokio::time::sleep(DEBOUNCE), if pending => {
                        pending = false;
                        reload(&reload_path, &tx);
                    }

                    event = raw_rx.recv() => {
                        match event {
                            Some(Ok(_)) => pending = true,
                            Some(Err(e)) => warn!(error = %e, "config watcher error"),
                            None => {
                                debug!("config watcher channel closed, stopping");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, rx))
    }
}

fn reload(path: &Path, tx: &watch::Sender<Arc<ImGateConfig>>) {
    match ImGateConfig::load(path) {
        Ok(config) => {
            info!(path = %path.display(), "config reloaded");
            let _ = tx.send(Arc::new(config));
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config reload rejected, keeping previous config");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_parses_yaml_and_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "server:\n  port: 9100\nnetty:\n  heartbeat_timeout_secs: 90").unwrap();

        let config = ImGateConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.netty.heartbeat_timeout_secs, 90);
        // Untouched fields keep their defaults.
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn load_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "retry:\n  max_retries: 3\n  delays: [1, 2]"
        )
        .unwrap();

        assert!(matches!(
            ImGateConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
