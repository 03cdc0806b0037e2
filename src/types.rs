//! Core types for media-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a download
///
/// Wraps a v4 UUID. The identifier is generated when a download is accepted
/// and stays stable for the life of the durable record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub Uuid);

impl DownloadId {
    /// Generate a fresh random DownloadId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for DownloadId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<DownloadId> for Uuid {
    fn from(id: DownloadId) -> Self {
        id.0
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DownloadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode so ids round-trip as TEXT columns
impl sqlx::Type<sqlx::Sqlite> for DownloadId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for DownloadId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode(self.0.to_string(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for DownloadId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(raw.parse()?))
    }
}

/// Acquisition method for a download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Plain HTTP object, streamed directly to disk
    Direct,
    /// Peer-to-peer transfer driven by a torrent engine
    Torrent,
    /// Magnet-only variant, anticipated but not yet registered
    Magnet,
}

impl Method {
    /// Canonical lowercase name, also the stored database form
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Direct => "direct",
            Method::Torrent => "torrent",
            Method::Magnet => "magnet",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Method::Direct),
            "torrent" => Ok(Method::Torrent),
            "magnet" => Ok(Method::Magnet),
            other => Err(format!("unknown download method: {}", other)),
        }
    }
}

/// Download status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Accepted, record persisted, transfer not yet confirmed running
    Pending,
    /// Transfer confirmed running by the provider
    Downloading,
    /// Successfully completed (terminal)
    Completed,
    /// Failed with an error message (terminal)
    Failed,
    /// Cancelled by the caller (terminal)
    Cancelled,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Pending,
            1 => Status::Downloading,
            2 => Status::Completed,
            3 => Status::Failed,
            4 => Status::Cancelled,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Pending => 0,
            Status::Downloading => 1,
            Status::Completed => 2,
            Status::Failed => 3,
            Status::Cancelled => 4,
        }
    }

    /// Whether this status is terminal (no further transitions or events)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }
}

/// Durable download record
///
/// This is the shape the state store persists. It outlives the runtime
/// [`DownloadProcess`](crate::process::DownloadProcess), which is discarded
/// once the download reaches a terminal state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Unique download identifier
    pub id: DownloadId,

    /// Acquisition method
    pub method: Method,

    /// Source URL (or magnet reference)
    pub url: String,

    /// Destination directory on the selected volume
    pub destination: PathBuf,

    /// Current status
    pub status: Status,

    /// Unix timestamp when the download was accepted
    pub created_at: i64,

    /// Error message, set when status is Failed
    pub error_message: Option<String>,
}

/// Point-in-time view of a download, live or recorded
///
/// For active downloads this reflects the runtime process (always fresher
/// than the store); for inactive ones it is derived from the durable record
/// with counters zeroed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadSnapshot {
    /// Unique download identifier
    pub id: DownloadId,

    /// Acquisition method
    pub method: Method,

    /// Source URL
    pub url: String,

    /// Destination directory
    pub destination: PathBuf,

    /// Current status
    pub status: Status,

    /// Unix timestamp when the download was accepted
    pub created_at: i64,

    /// Error message, set when status is Failed
    pub error_message: Option<String>,

    /// Bytes downloaded so far
    pub downloaded_bytes: u64,

    /// Total size in bytes (-1 = unknown)
    pub total_bytes: i64,

    /// Progress percentage in [0, 100], or exactly -1 when the total is unknown
    pub progress: f64,

    /// Current transfer speed in bytes per second
    pub speed_bps: u64,

    /// Estimated seconds to completion (-1 = unknown)
    pub eta_secs: i64,
}

impl DownloadSnapshot {
    /// Build a snapshot from a durable record alone
    ///
    /// Runtime counters are unavailable once a download is no longer active,
    /// so they collapse to zero/unknown. Completed records report progress
    /// 100 since the full object landed.
    pub fn from_record(record: DownloadRecord) -> Self {
        let progress = if record.status == Status::Completed {
            100.0
        } else {
            0.0
        };
        Self {
            id: record.id,
            method: record.method,
            url: record.url,
            destination: record.destination,
            status: record.status,
            created_at: record.created_at,
            error_message: record.error_message,
            downloaded_bytes: 0,
            total_bytes: -1,
            progress,
            speed_bps: 0,
            eta_secs: -1,
        }
    }
}
