//! Server configuration, loaded from a YAML file per §6's CLI contract
//! (`start -c <config.yaml> [-n <serverNode>]`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the RPC surface.
    pub listen_addr: String,
    /// Worker id (0-1023) for the Snowflake id generator; `None` selects a
    /// random worker id, matching the original's MAC-or-random fallback.
    pub worker_id: Option<i64>,

    /// §4.4: per-message timeout bounding a single branch RPC.
    pub stream_message_timeout_ms: u64,

    /// §4.6: the four reconciliation loop intervals.
    pub timeout_check_period_ms: u64,
    pub async_committing_period_ms: u64,
    pub committing_retry_period_ms: u64,
    pub rollback_retry_period_ms: u64,

    /// §9 open question: the non-TCC fast path is kept but made
    /// switchable.
    pub async_commit_enabled: bool,

    /// §9 open question: the rolling-back "dead window" is surfaced as
    /// configuration instead of a hard-coded ~12s constant.
    pub rollback_dead_window_ms: u64,

    /// Optional ceiling on how long a global may sit in a commit-retry
    /// state before being abandoned. `None` means retry forever.
    pub max_commit_retry_timeout_ms: Option<u64>,
    /// Same, for rollback retry states.
    pub max_rollback_retry_timeout_ms: Option<u64>,
    /// When abandoning a rollback-retry global past
    /// `max_rollback_retry_timeout_ms`, whether to release its locks first.
    pub rollback_retry_timeout_unlock_enable: bool,

    /// §9 design note: whether the per-XID `GlobalSessionLocker` actually
    /// locks, or stays a no-op stub like the original.
    pub global_session_locker_enabled: bool,

    /// Bounded page size for the timeout-check scan (§4.6 loop 1).
    pub timeout_scan_page_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8091".to_string(),
            worker_id: None,
            stream_message_timeout_ms: 30_000,
            timeout_check_period_ms: 1_000,
            async_committing_period_ms: 1_000,
            committing_retry_period_ms: 1_000,
            rollback_retry_period_ms: 1_000,
            async_commit_enabled: true,
            rollback_dead_window_ms: 12_000,
            max_commit_retry_timeout_ms: None,
            max_rollback_retry_timeout_ms: None,
            rollback_retry_timeout_unlock_enable: false,
            global_session_locker_enabled: true,
            timeout_scan_page_size: 100,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| CoordinatorError::Serialization(format!("{path:?}: {e}")))
    }

    pub fn stream_message_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_message_timeout_ms)
    }

    pub fn rollback_dead_window(&self) -> Duration {
        Duration::from_millis(self.rollback_dead_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_async_commit_enabled() {
        assert!(ServerConfig::default().async_commit_enabled);
    }

    #[test]
    fn load_parses_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tc.yaml");
        std::fs::write(&path, "listen_addr: \"0.0.0.0:9999\"\nworker_id: 7\n").unwrap();
        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9999");
        assert_eq!(cfg.worker_id, Some(7));
        // Unspecified fields fall back to defaults.
        assert!(cfg.async_commit_enabled);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = ServerConfig::load(Path::new("/nonexistent/tc.yaml"));
        assert!(matches!(result, Err(CoordinatorError::Io(_))));
    }
}
