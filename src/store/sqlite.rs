//! SQLite-backed state store

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::FromRow;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{DatabaseError, Error, Result};
use crate::types::{DownloadId, DownloadRecord, Method, Status};

use super::{RecordChanges, StateStore};

/// Raw downloads row as stored in SQLite
#[derive(Debug, Clone, FromRow)]
struct DownloadRow {
    id: DownloadId,
    method: String,
    url: String,
    destination: String,
    status: i32,
    created_at: i64,
    error_message: Option<String>,
}

impl DownloadRow {
    fn into_record(self) -> Result<DownloadRecord> {
        let method = Method::from_str(&self.method)
            .map_err(|e| Error::Database(DatabaseError::CorruptRecord(e)))?;
        Ok(DownloadRecord {
            id: self.id,
            method,
            url: self.url,
            destination: PathBuf::from(self.destination),
            status: Status::from_i32(self.status),
            created_at: self.created_at,
            error_message: self.error_message,
        })
    }
}

/// SQLite database handle implementing [`StateStore`]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at the given path and ensure the schema
    pub async fn new(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to open database at '{}': {}",
                path.display(),
                e
            )))
        })?;

        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    /// Open an in-memory database, useful for tests and ephemeral embedders
    pub async fn in_memory() -> Result<Self> {
        // A single pooled connection: each SQLite :memory: connection is its
        // own database, so the pool must never open a second one
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to open in-memory database: {}",
                    e
                )))
            })?;

        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                id TEXT PRIMARY KEY,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                destination TEXT NOT NULL,
                status INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create downloads table: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StateStore for Database {
    async fn add(&self, record: &DownloadRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO downloads (
                id, method, url, destination, status, created_at, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id)
        .bind(record.method.as_str())
        .bind(&record.url)
        .bind(record.destination.to_string_lossy().into_owned())
        .bind(record.status.to_i32())
        .bind(record.created_at)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert download: {}",
                e
            )))
        })?;

        tracing::info!(download_id = %record.id, "Download added to store");
        Ok(())
    }

    async fn update(&self, id: DownloadId, changes: &RecordChanges) -> Result<()> {
        if let Some(status) = changes.status {
            sqlx::query("UPDATE downloads SET status = ? WHERE id = ?")
                .bind(status.to_i32())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to update status: {}",
                        e
                    )))
                })?;
        }

        if let Some(ref message) = changes.error_message {
            sqlx::query("UPDATE downloads SET error_message = ? WHERE id = ?")
                .bind(message)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to set error message: {}",
                        e
                    )))
                })?;
        }

        Ok(())
    }

    async fn remove(&self, id: DownloadId) -> Result<()> {
        sqlx::query("DELETE FROM downloads WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete download: {}",
                    e
                )))
            })?;

        tracing::info!(download_id = %id, "Download removed from store");
        Ok(())
    }

    async fn get(&self, id: DownloadId) -> Result<Option<DownloadRecord>> {
        let row = sqlx::query_as::<_, DownloadRow>(
            r#"
            SELECT id, method, url, destination, status, created_at, error_message
            FROM downloads
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download: {}",
                e
            )))
        })?;

        row.map(DownloadRow::into_record).transpose()
    }

    async fn get_all(&self) -> Result<Vec<DownloadRecord>> {
        let rows = sqlx::query_as::<_, DownloadRow>(
            r#"
            SELECT id, method, url, destination, status, created_at, error_message
            FROM downloads
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list downloads: {}",
                e
            )))
        })?;

        rows.into_iter().map(DownloadRow::into_record).collect()
    }
}
