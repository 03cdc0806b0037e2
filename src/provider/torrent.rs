//! Torrent download provider
//!
//! Resolves the request's reference (fetching and caching the metadata
//! document for plain URLs, passing magnet references straight through),
//! hands it to the underlying [`TorrentEngine`], and relays the engine's
//! signals into provider updates. Peer-network resources are explicitly
//! released on done, error, and cancellation.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fsops;

use super::engine::{TorrentEngine, TorrentSignal, TorrentSource, TransferId};
use super::{CancellationHandle, DownloadProvider, ProviderUpdate, UpdateSender};

/// Provider for peer-to-peer torrent transfers
pub struct TorrentProvider {
    engine: Arc<dyn TorrentEngine>,
    client: reqwest::Client,
    metadata_cache_dir: PathBuf,
}

impl TorrentProvider {
    /// Create a provider over the given engine
    ///
    /// Ensures the metadata cache directory exists before returning.
    pub async fn new(engine: Arc<dyn TorrentEngine>, metadata_cache_dir: PathBuf) -> Result<Self> {
        fsops::ensure_dir_exists(&metadata_cache_dir).await?;
        Ok(Self {
            engine,
            client: reqwest::Client::new(),
            metadata_cache_dir,
        })
    }

    /// Resolve a request reference into something the engine accepts
    async fn resolve_source(&self, url: &str) -> Result<TorrentSource> {
        if url.starts_with("magnet:") {
            tracing::info!(url, "Starting torrent download from magnet reference");
            return Ok(TorrentSource::Magnet(url.to_string()));
        }
        let path = self.fetch_metadata_document(url).await?;
        Ok(TorrentSource::MetadataFile(path))
    }

    /// Fetch the metadata document for a plain URL reference, once
    ///
    /// The cache path is keyed by a SHA-256 hash of the source URL, so
    /// repeated requests for the same reference skip the network entirely.
    async fn fetch_metadata_document(&self, url: &str) -> Result<PathBuf> {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let url_hash = format!("{:x}", hasher.finalize());
        let cache_path = self.metadata_cache_dir.join(format!("{url_hash}.torrent"));

        if tokio::fs::try_exists(&cache_path).await? {
            tracing::info!(
                url,
                path = %cache_path.display(),
                "Metadata document already cached, skipping fetch"
            );
            return Ok(cache_path);
        }

        tracing::info!(url, path = %cache_path.display(), "Fetching metadata document");
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(&cache_path, &body).await?;

        Ok(cache_path)
    }
}

#[async_trait]
impl DownloadProvider for TorrentProvider {
    /// Always 0: a torrent's size is unknowable before peer metadata
    /// exchange, and parsing the metadata document here would duplicate the
    /// engine's work. Documented limitation, not a defect.
    async fn estimate_size(&self, _url: &str) -> Result<u64> {
        Ok(0)
    }

    async fn start(
        &self,
        url: &str,
        destination: &Path,
        updates: UpdateSender,
    ) -> Result<CancellationHandle> {
        let source = self.resolve_source(url).await?;

        let (signal_tx, signal_rx) = tokio::sync::mpsc::unbounded_channel();
        let transfer_id = self
            .engine
            .add_transfer(source, destination, signal_tx)
            .await
            .map_err(|e| Error::Provider(format!("failed to add torrent transfer: {e}")))?;

        let token = CancellationToken::new();
        let handle = CancellationHandle::new(token.clone());

        let engine = self.engine.clone();
        tokio::spawn(async move {
            relay_signals(engine, transfer_id, signal_rx, updates, token).await;
        });

        Ok(handle)
    }
}

/// Relay engine signals into provider updates until the transfer ends
async fn relay_signals(
    engine: Arc<dyn TorrentEngine>,
    transfer_id: TransferId,
    mut signals: tokio::sync::mpsc::UnboundedReceiver<TorrentSignal>,
    updates: UpdateSender,
    token: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            _ = token.cancelled() => {
                tracing::info!(transfer_id = %transfer_id, "Torrent download cancelled");
                release_transfer(&engine, transfer_id).await;
                return;
            }
            signal = signals.recv() => signal,
        };

        match signal {
            Some(TorrentSignal::Ready { name, total_bytes }) => {
                tracing::info!(
                    transfer_id = %transfer_id,
                    name = name.as_deref().unwrap_or("<unknown>"),
                    total_bytes,
                    "Torrent metadata loaded"
                );
                updates.send(ProviderUpdate::Started).ok();
            }
            Some(TorrentSignal::Progress {
                downloaded_bytes,
                total_bytes,
                speed_bps,
                eta_secs,
            }) => {
                updates
                    .send(ProviderUpdate::Progress {
                        downloaded_bytes,
                        total_bytes,
                        speed_bps,
                        eta_secs,
                    })
                    .ok();
            }
            Some(TorrentSignal::Done) => {
                tracing::info!(transfer_id = %transfer_id, "Torrent download completed");
                updates.send(ProviderUpdate::Completed).ok();
                release_transfer(&engine, transfer_id).await;
                return;
            }
            Some(TorrentSignal::Error(message)) => {
                updates.send(ProviderUpdate::Failed(message)).ok();
                release_transfer(&engine, transfer_id).await;
                return;
            }
            None => {
                // Engine dropped the channel without a terminal signal
                tracing::warn!(transfer_id = %transfer_id, "Torrent engine closed signal channel");
                return;
            }
        }
    }
}

/// Free the engine's peer-network resources for a transfer
async fn release_transfer(engine: &Arc<dyn TorrentEngine>, transfer_id: TransferId) {
    if let Err(e) = engine.remove_transfer(transfer_id).await {
        tracing::error!(transfer_id = %transfer_id, error = %e, "Failed to release torrent transfer");
    }
}
