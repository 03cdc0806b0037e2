//! Cancellation.

use serde_json::json;

use crate::error::{Error, Result};
use crate::store::RecordChanges;
use crate::types::{DownloadId, Status};

use super::DownloadManager;

impl DownloadManager {
    /// Cancel an active download
    ///
    /// Signals the provider through its cancellation handle, forces the
    /// tracked status to `cancelled` regardless of phase, persists the
    /// terminal status, and removes the job from the active table. The
    /// durable record is retained (not deleted) for audit.
    ///
    /// Fails with `NotFoundOrInactive` — and mutates nothing — when the id
    /// is unknown or the job already reached a terminal state.
    pub async fn cancel_download(&self, id: DownloadId) -> Result<()> {
        let entry = self.active.lock().await.remove(&id);
        let Some(entry) = entry else {
            tracing::warn!(
                download_id = %id,
                "Attempted to cancel non-existent or inactive download"
            );
            return Err(Error::NotFoundOrInactive { id });
        };

        entry.handle.cancel();

        // Cancel-vs-completion races resolve by "last transition wins, then
        // frozen": if the relay already applied a terminal state, this is a
        // no-op and nothing further is persisted or broadcast.
        let cancelled = entry.process.lock().await.cancel();
        if cancelled {
            if let Err(e) = self
                .store
                .update(id, &RecordChanges::status(Status::Cancelled))
                .await
            {
                tracing::error!(
                    download_id = %id,
                    error = %e,
                    "Failed to persist cancelled status"
                );
            }
            self.broadcaster.broadcast(
                id,
                "cancelled",
                &json!({
                    "download_id": id,
                    "status": Status::Cancelled,
                }),
            );
            tracing::info!(download_id = %id, "Download cancelled");
        }

        Ok(())
    }
}
