//! Configuration types for media-dl
//!
//! The configuration is a plain value constructed by the embedding
//! application and threaded through constructors. The library never loads
//! files or consults process-wide state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// A configured storage volume
///
/// Each volume is a directory with a tag-based eligibility scope and a
/// virtual capacity cap independent of the physical disk's total size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Unique volume name
    pub name: String,

    /// Root directory downloads land under
    pub root: PathBuf,

    /// Virtual capacity cap in gigabytes
    pub max_size_gb: f64,

    /// Labels a request must share at least one of (non-empty)
    pub tags: Vec<String>,
}

/// Volume monitoring settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between volume metric refreshes (default: 60)
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl MonitorConfig {
    /// Refresh interval as a Duration
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

/// Torrent provider settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TorrentProviderConfig {
    /// Directory where fetched torrent metadata documents are cached
    /// (default: "./torrents")
    #[serde(default = "default_metadata_cache_dir")]
    pub metadata_cache_dir: PathBuf,
}

impl Default for TorrentProviderConfig {
    fn default() -> Self {
        Self {
            metadata_cache_dir: default_metadata_cache_dir(),
        }
    }
}

/// Per-provider settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Torrent provider settings
    #[serde(default)]
    pub torrent: TorrentProviderConfig,
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./media-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for the download manager
///
/// Fields are organized into logical sub-configs:
/// - `volumes` — storage volume declarations (at least one required)
/// - [`monitor`](MonitorConfig) — metric refresh cadence
/// - [`providers`](ProvidersConfig) — per-provider settings
/// - [`persistence`](PersistenceConfig) — state store location
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage volume declarations (at least one required)
    pub volumes: Vec<VolumeConfig>,

    /// Volume monitoring settings
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Per-provider settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Data storage and state management
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// Checks the invariants a well-formed deployment must satisfy:
    /// at least one volume, unique volume names, positive virtual caps,
    /// and a non-empty tag set per volume.
    pub fn validate(&self) -> Result<()> {
        if self.volumes.is_empty() {
            return Err(Error::Config {
                message: "at least one volume must be configured".to_string(),
                key: Some("volumes".to_string()),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for volume in &self.volumes {
            if volume.name.is_empty() {
                return Err(Error::Config {
                    message: "volume name cannot be empty".to_string(),
                    key: Some("volumes.name".to_string()),
                });
            }
            if !seen.insert(volume.name.as_str()) {
                return Err(Error::Config {
                    message: format!("duplicate volume name: {}", volume.name),
                    key: Some("volumes.name".to_string()),
                });
            }
            if volume.max_size_gb <= 0.0 {
                return Err(Error::Config {
                    message: format!(
                        "volume {} must have a positive max_size_gb",
                        volume.name
                    ),
                    key: Some("volumes.max_size_gb".to_string()),
                });
            }
            if volume.tags.is_empty() || volume.tags.iter().any(|t| t.is_empty()) {
                return Err(Error::Config {
                    message: format!(
                        "volume {} must have at least one non-empty tag",
                        volume.name
                    ),
                    key: Some("volumes.tags".to_string()),
                });
            }
        }

        if self.monitor.check_interval_secs == 0 {
            return Err(Error::Config {
                message: "check_interval_secs must be greater than zero".to_string(),
                key: Some("monitor.check_interval_secs".to_string()),
            });
        }

        Ok(())
    }
}

fn default_check_interval_secs() -> u64 {
    60
}

fn default_metadata_cache_dir() -> PathBuf {
    PathBuf::from("./torrents")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./media-dl.db")
}
