//! Request admission, provider dispatch, and the per-job progress relay.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::fsops;
use crate::process::DownloadProcess;
use crate::provider::ProviderUpdate;
use crate::store::RecordChanges;
use crate::types::{DownloadId, DownloadRecord, Method, Status};
use crate::volume::selector::BYTES_PER_GB;

use super::{ActiveDownload, DownloadManager};

/// Minimum spacing between delivered progress broadcasts, per job
const PROGRESS_BROADCAST_INTERVAL: Duration = Duration::from_secs(1);

impl DownloadManager {
    /// Accept an acquisition request and begin the transfer
    ///
    /// Admission order matters: the method is validated before any resource
    /// is touched, the size estimate before volume selection, and the
    /// destination is only created once a volume has accepted the request.
    /// An estimate failure aborts with nothing persisted; a provider start
    /// failure leaves the record marked failed for audit.
    ///
    /// Returns the download id; all further progress is asynchronous and
    /// observable via [`get_status`](DownloadManager::get_status) or a
    /// subscribed event sink.
    pub async fn start_download(
        &self,
        method: Method,
        url: &str,
        tags: &[String],
    ) -> Result<DownloadId> {
        let id = DownloadId::new();
        tracing::info!(download_id = %id, %method, url, "Initiating download");

        let provider = self
            .providers
            .get(&method)
            .cloned()
            .ok_or_else(|| Error::UnsupportedMethod {
                method: method.to_string(),
            })?;

        let estimated_bytes = provider.estimate_size(url).await?;
        let estimated_size_gb = estimated_bytes as f64 / BYTES_PER_GB;
        tracing::info!(download_id = %id, estimated_size_gb, "Size estimated");

        let volume = self
            .volumes
            .select_volume(estimated_size_gb, tags)
            .await
            .ok_or_else(|| Error::NoSuitableVolume {
                required_gb: estimated_size_gb,
                tags: tags.to_vec(),
            })?;

        let destination = volume.config.root.join(id.to_string());
        fsops::ensure_dir_exists(&destination).await?;
        tracing::info!(
            download_id = %id,
            volume = %volume.config.name,
            destination = %destination.display(),
            "Destination prepared"
        );

        let record = DownloadRecord {
            id,
            method,
            url: url.to_string(),
            destination: destination.clone(),
            status: Status::Pending,
            created_at: chrono::Utc::now().timestamp(),
            error_message: None,
        };
        self.store.add(&record).await?;

        let total_bytes = if estimated_bytes > 0 {
            estimated_bytes as i64
        } else {
            -1
        };
        let process = Arc::new(tokio::sync::Mutex::new(DownloadProcess::new(
            record,
            total_bytes,
        )));

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        match provider.start(url, &destination, updates_tx).await {
            Ok(handle) => {
                self.active
                    .lock()
                    .await
                    .insert(id, ActiveDownload {
                        process: process.clone(),
                        handle,
                    });
                self.spawn_relay(id, process, updates_rx);
                Ok(id)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(store_err) = self
                    .store
                    .update(
                        id,
                        &RecordChanges::status(Status::Failed).with_error(message.clone()),
                    )
                    .await
                {
                    tracing::error!(
                        download_id = %id,
                        error = %store_err,
                        "Failed to persist start failure"
                    );
                }
                tracing::error!(download_id = %id, error = %message, "Failed to start download");
                Err(e)
            }
        }
    }

    /// Spawn the relay task that turns provider updates into state
    /// transitions, store writes, and broadcasts.
    ///
    /// Updates for one job arrive in the order the transfer produced them.
    /// Progress broadcasts are throttled to one per second with
    /// trailing-edge coalescing: within a window the latest sample is held
    /// and delivered when the window elapses. Terminal events are never
    /// throttled, and a state check before each transition guarantees
    /// nothing is emitted after a terminal state.
    fn spawn_relay(
        &self,
        id: DownloadId,
        process: Arc<tokio::sync::Mutex<DownloadProcess>>,
        mut updates: mpsc::UnboundedReceiver<ProviderUpdate>,
    ) {
        let store = self.store.clone();
        let broadcaster = self.broadcaster.clone();
        let active = self.active.clone();

        tokio::spawn(async move {
            let mut held: Option<serde_json::Value> = None;
            let mut next_emit = tokio::time::Instant::now();

            loop {
                tokio::select! {
                    update = updates.recv() => {
                        let Some(update) = update else {
                            // Provider dropped its sender without a terminal
                            // update (successful cancellation path)
                            break;
                        };
                        match update {
                            ProviderUpdate::Started => {
                                let started = process.lock().await.begin();
                                if started {
                                    tracing::info!(download_id = %id, "Download started");
                                    if let Err(e) = store
                                        .update(id, &RecordChanges::status(Status::Downloading))
                                        .await
                                    {
                                        tracing::error!(
                                            download_id = %id,
                                            error = %e,
                                            "Failed to persist downloading status"
                                        );
                                    }
                                }
                            }
                            ProviderUpdate::Progress {
                                downloaded_bytes,
                                total_bytes,
                                speed_bps,
                                eta_secs,
                            } => {
                                let snapshot = {
                                    let mut process = process.lock().await;
                                    if !process.update_progress(
                                        downloaded_bytes,
                                        total_bytes,
                                        speed_bps,
                                        eta_secs,
                                    ) {
                                        continue;
                                    }
                                    process.snapshot()
                                };
                                let payload = match serde_json::to_value(&snapshot) {
                                    Ok(payload) => payload,
                                    Err(e) => {
                                        tracing::error!(
                                            download_id = %id,
                                            error = %e,
                                            "Failed to serialize progress payload"
                                        );
                                        continue;
                                    }
                                };

                                let now = tokio::time::Instant::now();
                                if now >= next_emit {
                                    broadcaster.broadcast(id, "progress", &payload);
                                    next_emit = now + PROGRESS_BROADCAST_INTERVAL;
                                    held = None;
                                } else {
                                    held = Some(payload);
                                }
                            }
                            ProviderUpdate::Completed => {
                                // Drop any coalesced sample; terminal wins
                                held = None;
                                let snapshot = {
                                    let mut process = process.lock().await;
                                    if !process.complete() {
                                        break;
                                    }
                                    process.snapshot()
                                };
                                if let Err(e) = store
                                    .update(id, &RecordChanges::status(Status::Completed))
                                    .await
                                {
                                    tracing::error!(
                                        download_id = %id,
                                        error = %e,
                                        "Failed to persist completed status"
                                    );
                                }
                                active.lock().await.remove(&id);
                                tracing::info!(
                                    download_id = %id,
                                    path = %snapshot.destination.display(),
                                    "Download completed"
                                );
                                broadcaster.broadcast(
                                    id,
                                    "completed",
                                    &json!({
                                        "download_id": id,
                                        "status": Status::Completed,
                                        "progress": 100.0,
                                        "destination": snapshot.destination,
                                    }),
                                );
                                break;
                            }
                            ProviderUpdate::Failed(message) => {
                                held = None;
                                let applied = process.lock().await.fail(message.clone());
                                if !applied {
                                    break;
                                }
                                if let Err(e) = store
                                    .update(
                                        id,
                                        &RecordChanges::status(Status::Failed)
                                            .with_error(message.clone()),
                                    )
                                    .await
                                {
                                    tracing::error!(
                                        download_id = %id,
                                        error = %e,
                                        "Failed to persist failed status"
                                    );
                                }
                                active.lock().await.remove(&id);
                                tracing::error!(
                                    download_id = %id,
                                    error = %message,
                                    "Download failed"
                                );
                                broadcaster.broadcast(
                                    id,
                                    "error",
                                    &json!({
                                        "download_id": id,
                                        "status": Status::Failed,
                                        "error_message": message,
                                    }),
                                );
                                break;
                            }
                        }
                    }
                    _ = tokio::time::sleep_until(next_emit), if held.is_some() => {
                        if let Some(payload) = held.take() {
                            broadcaster.broadcast(id, "progress", &payload);
                            next_emit =
                                tokio::time::Instant::now() + PROGRESS_BROADCAST_INTERVAL;
                        }
                    }
                }
            }
        });
    }
}
