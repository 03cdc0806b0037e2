//! Download orchestration split into focused submodules.
//!
//! The `DownloadManager` struct and its methods are organized by domain:
//! - [`start`] - Request admission, provider dispatch, progress relay
//! - [`control`] - Cancellation
//! - [`status`] - Live and recorded status queries

mod control;
mod start;
mod status;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::events::{Broadcaster, EventSink, SubscriberId};
use crate::process::DownloadProcess;
use crate::provider::{
    CancellationHandle, DirectProvider, DownloadProvider, TorrentEngine, TorrentProvider,
};
use crate::store::StateStore;
use crate::types::{DownloadId, Method};
use crate::volume::VolumeManager;

/// One entry in the active-jobs table
pub(crate) struct ActiveDownload {
    /// Live runtime state, shared with the job's relay task
    pub(crate) process: Arc<tokio::sync::Mutex<DownloadProcess>>,
    /// Capability to stop the transfer
    pub(crate) handle: CancellationHandle,
}

/// Top-level download orchestrator
///
/// Wires providers, the volume manager, the event broadcaster, and the
/// state store into one request-to-completion pipeline. Active jobs live in
/// an in-memory table shadowing the durable store: promoted on start,
/// demoted on every terminal transition, after which the durable record is
/// the only copy.
pub struct DownloadManager {
    /// Provider registry, one implementation per acquisition method
    pub(crate) providers: HashMap<Method, Arc<dyn DownloadProvider>>,
    /// Volume selection and capacity tracking
    pub(crate) volumes: Arc<VolumeManager>,
    /// Per-download event fan-out
    pub(crate) broadcaster: Arc<Broadcaster>,
    /// Durable record persistence
    pub(crate) store: Arc<dyn StateStore>,
    /// Active-jobs table (protected by Mutex)
    pub(crate) active: Arc<tokio::sync::Mutex<HashMap<DownloadId, ActiveDownload>>>,
}

impl DownloadManager {
    /// Create a manager and register the built-in providers
    ///
    /// Registers the direct HTTP provider and a torrent provider over the
    /// given engine. A magnet-only provider is anticipated but not yet
    /// registered; requests for it fail with `UnsupportedMethod`.
    pub async fn new(
        config: &Config,
        volumes: Arc<VolumeManager>,
        broadcaster: Arc<Broadcaster>,
        store: Arc<dyn StateStore>,
        torrent_engine: Arc<dyn TorrentEngine>,
    ) -> Result<Self> {
        let mut providers: HashMap<Method, Arc<dyn DownloadProvider>> = HashMap::new();
        providers.insert(Method::Direct, Arc::new(DirectProvider::new()));

        let torrent_provider = TorrentProvider::new(
            torrent_engine,
            config.providers.torrent.metadata_cache_dir.clone(),
        )
        .await?;
        providers.insert(Method::Torrent, Arc::new(torrent_provider));

        tracing::info!("Download manager initialized");

        Ok(Self {
            providers,
            volumes,
            broadcaster,
            store,
            active: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        })
    }

    /// Register (or replace) the provider for a method
    ///
    /// This is the extension point for the anticipated magnet variant and
    /// for embedders with custom acquisition strategies.
    pub fn register_provider(&mut self, method: Method, provider: Arc<dyn DownloadProvider>) {
        self.providers.insert(method, provider);
    }

    /// Register an event sink as a subscriber of one download
    pub fn subscribe(&self, id: DownloadId, sink: Box<dyn EventSink>) -> SubscriberId {
        self.broadcaster.add_subscriber(id, sink)
    }

    /// Detach a subscriber; the event transport calls this on disconnect
    pub fn unsubscribe(&self, subscriber: SubscriberId) -> bool {
        self.broadcaster.remove_subscriber(subscriber)
    }

    /// Current fan-out size for a download
    pub fn subscriber_count(&self, id: DownloadId) -> usize {
        self.broadcaster.subscriber_count(id)
    }
}
