//! Engine-agnostic torrent interface
//!
//! The peer-to-peer machinery itself (session management, piece exchange,
//! tracker/DHT traffic) lives behind [`TorrentEngine`]; the torrent provider
//! only hands over a resolved source and relays the engine's signals. This
//! keeps the engine binding (libtorrent FFI, an external daemon, a pure-Rust
//! implementation) swappable without touching orchestration code.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Engine-assigned identifier for one active transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransferId(pub u64);

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved reference handed to the engine
#[derive(Clone, Debug, PartialEq)]
pub enum TorrentSource {
    /// Path to a cached metadata document (.torrent file)
    MetadataFile(PathBuf),
    /// Self-describing magnet reference, no metadata fetch needed
    Magnet(String),
}

/// Signal emitted by the engine for one transfer
#[derive(Clone, Debug, PartialEq)]
pub enum TorrentSignal {
    /// Peer metadata exchange finished; the transfer is live
    Ready {
        /// Torrent name from the metadata, if known
        name: Option<String>,
        /// Total payload size in bytes (-1 = still unknown)
        total_bytes: i64,
    },

    /// A progress sample
    Progress {
        /// Bytes downloaded so far
        downloaded_bytes: u64,
        /// Total payload size in bytes (-1 = unknown)
        total_bytes: i64,
        /// Current download speed in bytes per second
        speed_bps: u64,
        /// Estimated seconds to completion (-1 = unknown)
        eta_secs: i64,
    },

    /// The transfer finished successfully
    Done,

    /// The transfer failed
    Error(String),
}

/// Sending half of a transfer's signal channel
pub type SignalSender = tokio::sync::mpsc::UnboundedSender<TorrentSignal>;

/// Peer-to-peer transfer engine
///
/// Implementations own all peer-network resources for their transfers.
/// `remove_transfer` must release them and is called by the provider on
/// done, on error, and on cancellation; calling it for an already-released
/// transfer must be a harmless no-op.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Register a transfer and begin downloading into `download_dir`
    ///
    /// Lifecycle is reported through `signals`; the engine stops sending
    /// once the transfer is removed.
    async fn add_transfer(
        &self,
        source: TorrentSource,
        download_dir: &Path,
        signals: SignalSender,
    ) -> Result<TransferId>;

    /// Stop a transfer and release its peer-network resources
    async fn remove_transfer(&self, id: TransferId) -> Result<()>;
}
