//! Volume resource management
//!
//! A volume is a configured storage location with a tag-based eligibility
//! scope and a virtual capacity cap independent of the physical disk. The
//! [`VolumeMonitor`] owns the mutable per-volume metrics and refreshes them
//! on a timer; the [`selector`] is a pure filter-and-rank function over the
//! monitor's snapshots; [`VolumeManager`] composes the two.

use std::time::Duration;

use crate::config::VolumeConfig;

mod monitor;
pub mod selector;

pub use monitor::{VolumeMonitor, VolumeState};

/// Composed volume selection and state-query facade
pub struct VolumeManager {
    monitor: VolumeMonitor,
}

impl VolumeManager {
    /// Create a manager over the given volume declarations
    pub fn new(volumes: Vec<VolumeConfig>, check_interval: Duration) -> Self {
        Self {
            monitor: VolumeMonitor::new(volumes, check_interval),
        }
    }

    /// Measure every volume synchronously, then begin periodic monitoring
    ///
    /// Callers may rely on fresh metrics immediately after this returns.
    pub async fn initialize(&self) {
        self.monitor.initialize().await;
        self.monitor.start_monitoring();
    }

    /// Pick the best volume for a download, if any qualifies
    ///
    /// See [`selector::select_volume`] for the filter and ranking rules.
    pub async fn select_volume(
        &self,
        required_size_gb: f64,
        tags: &[String],
    ) -> Option<VolumeState> {
        let states = self.monitor.all_volume_states().await;
        let selected = selector::select_volume(&states, required_size_gb, tags);
        match &selected {
            Some(volume) => tracing::info!(
                volume = %volume.config.name,
                required_size_gb,
                tags = ?tags,
                "Selected volume"
            ),
            None => tracing::warn!(
                required_size_gb,
                tags = ?tags,
                "No suitable volume found"
            ),
        }
        selected
    }

    /// Snapshot of one volume's state
    pub async fn volume_state(&self, name: &str) -> Option<VolumeState> {
        self.monitor.volume_state(name).await
    }

    /// Snapshots of every volume's state
    pub async fn all_volume_states(&self) -> Vec<VolumeState> {
        self.monitor.all_volume_states().await
    }

    /// Stop the periodic refresh; idempotent
    pub fn stop_monitoring(&self) {
        self.monitor.stop_monitoring();
    }
}
