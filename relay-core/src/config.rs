//! Relay configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.relay/
//!   config.yaml      (optional, defaults apply when absent)
//!   store/records.json
//!   broker/<topic>/partition-<n>.jsonl
//! ```
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{config_io, ConfigError};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.relay/`
pub fn relay_root(home: &Path) -> PathBuf {
    home.join(".relay")
}

/// `<home>/.relay/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    relay_root(home).join("config.yaml")
}

/// `<home>/.relay/store/records.json`
pub fn default_store_path(home: &Path) -> PathBuf {
    relay_root(home).join("store").join("records.json")
}

/// `<home>/.relay/broker/`
pub fn default_spool_dir(home: &Path) -> PathBuf {
    relay_root(home).join("broker")
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 2. Config types
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Stamped on every event as `source_service`.
    pub service_name: String,
    pub store: StoreConfig,
    pub broker: BrokerConfig,
    pub bulk_sync: BulkSyncConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            service_name: "employee-registry".to_string(),
            store: StoreConfig::default(),
            broker: BrokerConfig::default(),
            bulk_sync: BulkSyncConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Defaults to `<home>/.relay/store/records.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Records per fetch; 0 fetches every unsynced record at once.
    pub batch_size: usize,
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            batch_size: 0,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Defaults to `<home>/.relay/broker`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<PathBuf>,
    pub queue_capacity: usize,
    pub send_timeout_ms: u64,
    pub topics: TopicsConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            spool_dir: None,
            queue_capacity: 1024,
            send_timeout_ms: 5_000,
            topics: TopicsConfig::default(),
        }
    }
}

/// Topic provisioning is configuration, never done by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Destination of single-entity "created" events.
    pub created: TopicConfig,
    /// Destination of drain-loop events.
    pub bulk_sync: TopicConfig,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            created: TopicConfig::new("employee-sync", 3),
            bulk_sync: TopicConfig::new("employee-bulk-sync", 5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    pub partitions: u32,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>, partitions: u32) -> Self {
        Self {
            name: name.into(),
            partitions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkSyncConfig {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    /// Pause between the end of one scheduled run and the start of the next.
    pub fixed_delay_ms: u64,
    /// Pause between two record publishes inside a batch.
    pub record_delay_ms: u64,
}

impl Default for BulkSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 10_000,
            fixed_delay_ms: 60_000,
            record_delay_ms: 10,
        }
    }
}

impl BulkSyncConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn fixed_delay(&self) -> Duration {
        Duration::from_millis(self.fixed_delay_ms)
    }

    pub fn record_delay(&self) -> Duration {
        Duration::from_millis(self.record_delay_ms)
    }
}

impl RelayConfig {
    pub fn store_path(&self, home: &Path) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| default_store_path(home))
    }

    pub fn spool_dir(&self, home: &Path) -> PathBuf {
        self.broker
            .spool_dir
            .clone()
            .unwrap_or_else(|| default_spool_dir(home))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.send_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// 3. Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.relay/config.yaml`, falling back to defaults when absent.
///
/// Returns `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<RelayConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(RelayConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| config_io(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<RelayConfig, ConfigError> {
    load_at(&home()?)
}

/// Save the config atomically (`config.yaml.tmp` + rename).
pub fn save_at(home: &Path, config: &RelayConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(home);
    let dir = relay_root(home);
    std::fs::create_dir_all(&dir).map_err(|e| config_io(&dir, e))?;

    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| config_io(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| config_io(&path, e))?;
    Ok(path)
}
