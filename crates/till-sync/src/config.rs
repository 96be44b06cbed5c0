//! # Sync Configuration
//!
//! Configuration for the sync engine, loaded with a simple priority chain:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │   1. Environment variables  (TILL_REMOTE_URL, TILL_FORCE_OFFLINE, …)   │
//! │   2. TOML file              (~/.config/till-pos/sync.toml)             │
//! │   3. Built-in defaults                                                 │
//! │                                                                         │
//! │   Higher wins. The file is optional; a missing file is defaults.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is validated before use so a bad deployment fails at startup
//! with a readable message instead of mid-shift.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::cache::CacheSettings;
use crate::coordinator::DrainSettings;
use crate::error::{SyncError, SyncResult};

/// Environment variable overriding the remote base URL.
pub const ENV_REMOTE_URL: &str = "TILL_REMOTE_URL";
/// Environment variable forcing the till offline at startup.
pub const ENV_FORCE_OFFLINE: &str = "TILL_FORCE_OFFLINE";
/// Environment variable overriding the database path.
pub const ENV_DATABASE_PATH: &str = "TILL_DATABASE_PATH";

/// Top-level sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub remote: RemoteSection,
    pub database: DatabaseSection,
    pub queue: QueueSection,
    pub drain: DrainSection,
    pub cache: CacheSection,
    pub reconciliation: ReconciliationSection,
}

/// Remote endpoint and probing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteSection {
    /// Base URL of the remote system of record.
    pub base_url: String,
    /// Per-request deadline for mutations and fetches.
    pub request_timeout_secs: u64,
    /// Deadline for the lightweight health probe.
    pub probe_timeout_secs: u64,
    /// Start with the manual offline switch set.
    pub force_offline: bool,
}

impl Default for RemoteSection {
    fn default() -> Self {
        RemoteSection {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 15,
            probe_timeout_secs: 3,
            force_offline: false,
        }
    }
}

/// Local database location.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite file path. Empty means the platform data directory.
    pub path: Option<PathBuf>,
}

/// Pending-operation queue limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueSection {
    /// Operations fetched per drain pass.
    pub batch_size: u32,
    /// Transient failures tolerated per operation before dead-lettering.
    pub max_attempts: i64,
}

impl Default for QueueSection {
    fn default() -> Self {
        QueueSection {
            batch_size: till_core::DEFAULT_BATCH_SIZE,
            max_attempts: till_core::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Drain-loop timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DrainSection {
    /// Fixed delay before retrying after a paused drain.
    pub retry_delay_secs: u64,
    /// How long a submit caller waits on its best-effort drain.
    pub submit_timeout_secs: u64,
    /// Background connectivity/drain tick.
    pub poll_interval_secs: u64,
}

impl Default for DrainSection {
    fn default() -> Self {
        DrainSection {
            retry_delay_secs: 30,
            submit_timeout_secs: 5,
            poll_interval_secs: 60,
        }
    }
}

/// Remote-state cache behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSection {
    /// Freshness window for cached state documents.
    pub ttl_secs: u64,
    /// Refresh aging entries in the background on read.
    pub auto_refresh: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        CacheSection {
            ttl_secs: 300,
            auto_refresh: true,
        }
    }
}

/// Closing-validation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconciliationSection {
    /// When offline, allow closing a drawer on trust of local state.
    pub permissive_offline_validation: bool,
}

impl Default for ReconciliationSection {
    fn default() -> Self {
        ReconciliationSection {
            permissive_offline_validation: true,
        }
    }
}

impl SyncConfig {
    /// Platform-default config file location
    /// (`~/.config/till-pos/sync.toml` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "till", "till-pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    /// Platform-default database location
    /// (`~/.local/share/till-pos/till.db` on Linux).
    pub fn default_database_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "till", "till-pos").map(|dirs| dirs.data_dir().join("till.db"))
    }

    /// Loads from a TOML file, applies environment overrides, validates.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {e}", path.display())))?;
        let mut config: SyncConfig = toml::from_str(&raw)
            .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {e}", path.display())))?;
        config.apply_env_overrides();
        config.validate()?;
        info!(path = %path.display(), "Sync configuration loaded");
        Ok(config)
    }

    /// Loads the file if it exists; otherwise defaults. Environment
    /// overrides and validation apply either way.
    pub fn load_or_default(path: Option<&Path>) -> SyncResult<Self> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        if let Some(p) = resolved {
            if p.exists() {
                return Self::load(&p);
            }
            debug!(path = %p.display(), "No configuration file, using defaults");
        }

        let mut config = SyncConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        let rendered = toml::to_string_pretty(self)
            .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(path, rendered)
            .map_err(|e| SyncError::ConfigSaveFailed(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "Sync configuration saved");
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_REMOTE_URL) {
            self.remote.base_url = url;
        }
        if let Ok(forced) = std::env::var(ENV_FORCE_OFFLINE) {
            self.remote.force_offline = matches!(forced.as_str(), "1" | "true" | "yes");
        }
        if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    /// Rejects configurations that would misbehave at runtime.
    pub fn validate(&self) -> SyncResult<()> {
        let url = Url::parse(&self.remote.base_url)
            .map_err(|e| SyncError::InvalidConfig(format!("remote.base_url: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidConfig(format!(
                "remote.base_url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.remote.request_timeout_secs == 0 || self.remote.probe_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "remote timeouts must be at least 1 second".to_string(),
            ));
        }
        if self.queue.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "queue.batch_size must be at least 1".to_string(),
            ));
        }
        if self.queue.max_attempts < 1 {
            return Err(SyncError::InvalidConfig(
                "queue.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.drain.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "drain.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "cache.ttl_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Runtime conversions
    // =========================================================================

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.probe_timeout_secs)
    }

    pub fn drain_settings(&self) -> DrainSettings {
        DrainSettings {
            batch_size: self.queue.batch_size,
            max_attempts: self.queue.max_attempts,
            retry_delay: Duration::from_secs(self.drain.retry_delay_secs),
            submit_timeout: Duration::from_secs(self.drain.submit_timeout_secs),
            poll_interval: Duration::from_secs(self.drain.poll_interval_secs),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            auto_refresh: self.cache.auto_refresh,
            default_state: Value::Object(serde_json::Map::new()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.queue.batch_size, till_core::DEFAULT_BATCH_SIZE);
        assert!(config.reconciliation.permissive_offline_validation);
        assert!(!config.remote.force_offline);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [remote]
            base_url = "https://pos.example.com"

            [cache]
            ttl_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.base_url, "https://pos.example.com");
        assert_eq!(config.remote.request_timeout_secs, 15);
        assert_eq!(config.cache.ttl_secs, 60);
        assert!(config.cache.auto_refresh);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SyncConfig::default();
        config.remote.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        let mut config = SyncConfig::default();
        config.remote.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.queue.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("till-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("sync.toml");

        let mut config = SyncConfig::default();
        config.remote.base_url = "https://pos.example.com".to_string();
        config.queue.max_attempts = 3;
        config.save(&path).unwrap();

        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("till-no-such-config.toml");
        let config = SyncConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.remote.request_timeout_secs, 15);
    }
}
