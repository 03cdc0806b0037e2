//! Error types for media-dl
//!
//! Every failure an embedding application can observe flows through the
//! [`Error`] enum. Validation failures (unsupported method, no suitable
//! volume) are rejected before any resource is touched; provider and store
//! failures carry enough context to diagnose which stage broke.

use crate::types::DownloadId;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// No provider registered for the requested acquisition method
    #[error("unsupported download method: {method}")]
    UnsupportedMethod {
        /// The method name that had no registered provider
        method: String,
    },

    /// No configured volume can accept the download
    #[error(
        "no suitable volume found for download with estimated size {required_gb} GB and tags {}",
        .tags.join(", ")
    )]
    NoSuitableVolume {
        /// Estimated size of the download in gigabytes
        required_gb: f64,
        /// Tags the request asked for
        tags: Vec<String>,
    },

    /// Download is unknown or no longer active (cancel path)
    #[error("download {id} not found or not active")]
    NotFoundOrInactive {
        /// The download ID that was not found in the active table
        id: DownloadId,
    },

    /// Download not found
    #[error("download not found: {0}")]
    NotFound(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "volumes")
        key: Option<String>,
    },

    /// State store operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Provider failed to start or drive a transfer
    #[error("provider error: {0}")]
    Provider(String),

    /// Torrent engine error
    #[error("torrent engine error: {0}")]
    Engine(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// State-store errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or migrate the schema
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded into a record
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}
