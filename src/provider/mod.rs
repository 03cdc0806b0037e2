//! Acquisition providers
//!
//! A provider is one strategy for getting bytes onto disk. The download
//! manager resolves a provider per request method and drives it through a
//! narrow contract: estimate, start, cancel. Transfer lifecycle is reported
//! back as explicit [`ProviderUpdate`] messages over a channel — the
//! manager's relay task owns ordering and the exactly-one-terminal
//! guarantee, providers just report what happened.

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

mod direct;
mod engine;
mod torrent;

pub use direct::DirectProvider;
pub use engine::{TorrentEngine, TorrentSignal, TorrentSource, TransferId};
pub use torrent::TorrentProvider;

/// Lifecycle message emitted by a provider for one transfer
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderUpdate {
    /// The transfer is confirmed running (headers received, metadata loaded)
    Started,

    /// A progress sample
    Progress {
        /// Bytes downloaded so far
        downloaded_bytes: u64,
        /// Total size in bytes (-1 = unknown)
        total_bytes: i64,
        /// Instantaneous transfer speed in bytes per second
        speed_bps: u64,
        /// Estimated seconds to completion (-1 = unknown)
        eta_secs: i64,
    },

    /// The transfer finished successfully (terminal)
    Completed,

    /// The transfer failed (terminal)
    Failed(String),
}

/// Sending half of a transfer's update channel
pub type UpdateSender = tokio::sync::mpsc::UnboundedSender<ProviderUpdate>;

/// Capability to stop one active transfer
///
/// Exactly one handle exists per active download. `cancel` is idempotent and
/// safe after the transfer has already reached a terminal state (no-op).
/// After a successful cancellation the provider emits no further updates.
#[derive(Clone, Debug)]
pub struct CancellationHandle {
    token: CancellationToken,
}

impl CancellationHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Signal the provider to stop the transfer
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Contract every acquisition strategy must satisfy
#[async_trait]
pub trait DownloadProvider: Send + Sync {
    /// Best-effort size estimate for a source URL, in bytes
    ///
    /// `Ok(0)` means "unknown" and is a valid answer, distinct from an
    /// error, which aborts job creation entirely.
    async fn estimate_size(&self, url: &str) -> Result<u64>;

    /// Begin a transfer into the destination directory
    ///
    /// Guarantees exactly one of `Completed`/`Failed` on a non-cancelled
    /// terminal outcome, and neither after a successful cancellation.
    async fn start(
        &self,
        url: &str,
        destination: &Path,
        updates: UpdateSender,
    ) -> Result<CancellationHandle>;
}
