//! Periodic volume metric measurement
//!
//! The monitor is the sole writer of volume metrics. Free physical space
//! comes from the filesystem, used space from a recursive walk of the
//! volume root; both are re-measured, never derived from admission
//! decisions, so the overcommit window between admission and completion
//! closes on the next tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::VolumeConfig;
use crate::fsops;

/// A volume's configuration plus its last measured metrics
#[derive(Clone, Debug, serde::Serialize)]
pub struct VolumeState {
    /// Static declaration this state was seeded from
    pub config: VolumeConfig,

    /// Physical free space on the backing filesystem, in bytes
    pub free_space_bytes: u64,

    /// Recursive size of files under the volume root, in bytes
    pub current_usage_bytes: u64,

    /// Unix timestamp of the last successful measurement (0 = never)
    pub last_checked: i64,
}

impl VolumeState {
    fn seed(config: VolumeConfig) -> Self {
        Self {
            config,
            free_space_bytes: 0,
            current_usage_bytes: 0,
            last_checked: 0,
        }
    }
}

/// Owner of mutable per-volume capacity metrics
pub struct VolumeMonitor {
    volumes: Arc<RwLock<HashMap<String, VolumeState>>>,
    check_interval: Duration,
    refresh_token: Mutex<Option<CancellationToken>>,
}

impl VolumeMonitor {
    /// Seed the monitor from static volume declarations, metrics zeroed
    pub fn new(volumes: Vec<VolumeConfig>, check_interval: Duration) -> Self {
        let seeded = volumes
            .into_iter()
            .map(|config| (config.name.clone(), VolumeState::seed(config)))
            .collect();

        Self {
            volumes: Arc::new(RwLock::new(seeded)),
            check_interval,
            refresh_token: Mutex::new(None),
        }
    }

    /// Ensure each volume's root exists, then measure every volume
    ///
    /// All volumes are processed concurrently; one volume's failure is
    /// logged and absorbed without blocking the others. Metrics are fresh
    /// when this returns.
    pub async fn initialize(&self) {
        tracing::info!("Initializing volume monitor");

        let entries: Vec<(String, std::path::PathBuf)> = {
            let volumes = self.volumes.read().await;
            volumes
                .values()
                .map(|v| (v.config.name.clone(), v.config.root.clone()))
                .collect()
        };

        let tasks = entries.into_iter().map(|(name, root)| async move {
            if let Err(e) = fsops::ensure_dir_exists(&root).await {
                tracing::error!(
                    volume = %name,
                    path = %root.display(),
                    error = %e,
                    "Failed to initialize volume"
                );
                return;
            }
            self.refresh_volume(&name).await;
        });
        futures::future::join_all(tasks).await;

        tracing::info!("Volume monitor initialized");
    }

    /// Begin the recurring refresh of every volume's metrics
    pub fn start_monitoring(&self) {
        let mut guard = self
            .refresh_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_some() {
            tracing::warn!("Volume monitoring is already running");
            return;
        }

        tracing::info!(
            interval_secs = self.check_interval.as_secs(),
            "Starting volume monitoring"
        );
        let token = CancellationToken::new();
        *guard = Some(token.clone());

        let volumes = self.volumes.clone();
        let check_interval = self.check_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the cadence
            // starts one interval after initialize() measured everything.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        refresh_all(&volumes).await;
                    }
                    _ = token.cancelled() => {
                        break;
                    }
                }
            }
        });
    }

    /// Cancel the recurring refresh; idempotent
    pub fn stop_monitoring(&self) {
        let token = {
            let mut guard = self
                .refresh_token
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take()
        };
        if let Some(token) = token {
            token.cancel();
            tracing::info!("Stopped volume monitoring");
        }
    }

    /// Re-measure one volume's free space and usage
    async fn refresh_volume(&self, name: &str) {
        refresh_one(&self.volumes, name).await;
    }

    /// Snapshot of one volume's state
    pub async fn volume_state(&self, name: &str) -> Option<VolumeState> {
        self.volumes.read().await.get(name).cloned()
    }

    /// Snapshots of every volume's state
    pub async fn all_volume_states(&self) -> Vec<VolumeState> {
        self.volumes.read().await.values().cloned().collect()
    }
}

impl Drop for VolumeMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

/// Refresh every volume concurrently; failures stay local to their volume
async fn refresh_all(volumes: &Arc<RwLock<HashMap<String, VolumeState>>>) {
    tracing::debug!("Refreshing volume metrics");
    let names: Vec<String> = {
        let guard = volumes.read().await;
        guard.keys().cloned().collect()
    };

    let tasks = names.iter().map(|name| refresh_one(volumes, name));
    futures::future::join_all(tasks).await;
}

/// Measure one volume and store the result
///
/// A failed measurement resets the affected metric to a conservative zero —
/// stale values must never keep a dead volume selectable.
async fn refresh_one(volumes: &Arc<RwLock<HashMap<String, VolumeState>>>, name: &str) {
    let root = {
        let guard = volumes.read().await;
        let Some(state) = guard.get(name) else {
            tracing::warn!(volume = %name, "Attempted to refresh non-existent volume");
            return;
        };
        state.config.root.clone()
    };

    let free_space = match fsops::available_space(&root) {
        Ok(free) => {
            tracing::debug!(volume = %name, free_bytes = free, "Updated volume free space");
            free
        }
        Err(e) => {
            tracing::error!(volume = %name, error = %e, "Failed to check free space");
            0
        }
    };

    let usage = match fsops::directory_size(&root).await {
        Ok(used) => {
            tracing::debug!(volume = %name, used_bytes = used, "Updated volume usage");
            used
        }
        Err(e) => {
            tracing::error!(volume = %name, error = %e, "Failed to measure volume usage");
            0
        }
    };

    let mut guard = volumes.write().await;
    if let Some(state) = guard.get_mut(name) {
        state.free_space_bytes = free_space;
        state.current_usage_bytes = usage;
        state.last_checked = chrono::Utc::now().timestamp();
    }
}
