//! Live and recorded status queries.

use crate::error::Result;
use crate::types::{DownloadId, DownloadSnapshot};

use super::DownloadManager;

impl DownloadManager {
    /// Status of one download
    ///
    /// The live runtime state is returned while the job is active (it is
    /// always fresher than the store); afterwards the durable record is the
    /// source of truth. `None` means the id was never seen.
    pub async fn get_status(&self, id: DownloadId) -> Result<Option<DownloadSnapshot>> {
        if let Some(entry) = self.active.lock().await.get(&id) {
            return Ok(Some(entry.process.lock().await.snapshot()));
        }

        Ok(self
            .store
            .get(id)
            .await?
            .map(DownloadSnapshot::from_record))
    }

    /// Status of every known download
    ///
    /// The union of all durable records, each overridden by its live
    /// runtime state when the job is active.
    pub async fn get_all_status(&self) -> Result<Vec<DownloadSnapshot>> {
        let records = self.store.get_all().await?;
        let active = self.active.lock().await;

        let mut snapshots = Vec::with_capacity(records.len());
        for record in records {
            match active.get(&record.id) {
                Some(entry) => snapshots.push(entry.process.lock().await.snapshot()),
                None => snapshots.push(DownloadSnapshot::from_record(record)),
            }
        }

        Ok(snapshots)
    }
}
