//! State store layer for media-dl
//!
//! The durable side of the two-tier state model: the download manager keeps
//! an in-memory active table for live jobs and treats the store as the
//! source of truth for everything else. The [`StateStore`] trait is the
//! plugin boundary; [`Database`] is the provided SQLite implementation.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DownloadId, DownloadRecord, Status};

mod sqlite;

pub use sqlite::Database;

/// Partial update applied to a persisted download record
///
/// Only the populated fields are written, mirroring how terminal transitions
/// touch status and error message but never the identity fields.
#[derive(Clone, Debug, Default)]
pub struct RecordChanges {
    /// New status, if changing
    pub status: Option<Status>,
    /// New error message, if setting one
    pub error_message: Option<String>,
}

impl RecordChanges {
    /// Change the status only
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            error_message: None,
        }
    }

    /// Attach an error message to this change set
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Durable persistence for download records
///
/// Storage technology is unconstrained; implementations must keep
/// `downloadId` unique and tolerate partial updates.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Prepare the store for a new session
    ///
    /// Hook for restoring in-flight transfers from a previous run. No resume
    /// logic exists yet, so the default implementation does nothing.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Persist a new download record
    async fn add(&self, record: &DownloadRecord) -> Result<()>;

    /// Apply a partial update to an existing record
    async fn update(&self, id: DownloadId, changes: &RecordChanges) -> Result<()>;

    /// Remove a record
    async fn remove(&self, id: DownloadId) -> Result<()>;

    /// Fetch one record by id
    async fn get(&self, id: DownloadId) -> Result<Option<DownloadRecord>>;

    /// Fetch all records
    async fn get_all(&self) -> Result<Vec<DownloadRecord>>;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
