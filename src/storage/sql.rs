// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite document store for Tier-2.
//!
//! One row per document, overwritten whole:
//! ```sql
//! CREATE TABLE snapshot_documents (
//!   id         TEXT PRIMARY KEY,
//!   payload    TEXT NOT NULL,    -- snapshot JSON
//!   updated_at INTEGER NOT NULL  -- epoch millis of the write
//! )
//! ```
//!
//! `sqlite::memory:` URLs are supported for tests; the pool is pinned to a
//! single long-lived connection so the database is not dropped between queries.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use super::traits::{DocumentStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Connect with startup-mode retry (fails fast if the path is wrong).
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        Self::with_retry(url, &RetryConfig::startup()).await
    }

    pub async fn with_retry(url: &str, retry_config: &RetryConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Unavailable(format!("bad sqlite url: {e}")))?
            .create_if_missing(true);
        let in_memory = url.contains(":memory:");

        let pool = retry("sqlite_connect", retry_config, || async {
            let pool_options = if in_memory {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
            } else {
                SqlitePoolOptions::new()
                    .max_connections(4)
                    .idle_timeout(Duration::from_secs(300))
            };
            pool_options
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))
        })
        .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(url = %url, "Local document store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshot_documents (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        Ok(())
    }

    /// Get a clone of the pool (for diagnostics and tests)
    #[must_use]
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn load(&self, id: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT payload FROM snapshot_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(|r| r.try_get::<String, _>("payload"))
            .transpose()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn save(&self, id: &str, document: &str) -> Result<(), StorageError> {
        let updated_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;

        sqlx::query(
            "INSERT INTO snapshot_documents (id, payload, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(id)
        .bind(document)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        debug!(id = %id, bytes = document.len(), "Document written to SQLite");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        if self.pool.is_closed() {
            return false;
        }
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = SqliteDocumentStore::new("sqlite::memory:").await.unwrap();
        assert!(store.is_available().await);
        assert!(store.load("progress").await.unwrap().is_none());

        store.save("progress", "{\"version\":3}").await.unwrap();
        store.save("progress", "{\"version\":4}").await.unwrap();

        assert_eq!(store.load("progress").await.unwrap().as_deref(), Some("{\"version\":4}"));
    }

    #[tokio::test]
    async fn test_file_store_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("local.db").display());

        let store = SqliteDocumentStore::new(&url).await.unwrap();
        store.save("progress", "{\"a\":1}").await.unwrap();
        store.close().await;
        assert!(!store.is_available().await);

        let store = SqliteDocumentStore::new(&url).await.unwrap();
        assert_eq!(store.load("progress").await.unwrap().as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn test_bad_url_is_unavailable() {
        let result = SqliteDocumentStore::with_retry("postgres://nope", &RetryConfig::test()).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }
}
