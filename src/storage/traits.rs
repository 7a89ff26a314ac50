// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage medium contracts.
//!
//! These are the raw media under each tier. They deal in serialized JSON
//! strings and report every failure as a [`StorageError`]; the tier
//! adapters in [`crate::tiers`] decode snapshots and swallow the errors.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The medium cannot be reached or opened
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    /// A Tier-1 write would exceed the configured capacity
    #[error("Quota exceeded: write needs {needed} bytes, limit is {limit}")]
    QuotaExceeded { needed: usize, limit: usize },
    /// A snapshot could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Remote sync has not been set up
    #[error("Remote store is not configured")]
    RemoteUnconfigured,
    /// Transient network failure talking to the remote
    #[error("Remote unreachable: {0}")]
    RemoteUnreachable(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Tier-1 medium: small, fast, synchronous string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`. May fail with [`StorageError::QuotaExceeded`].
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Tier-2 medium: asynchronous local document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<String>, StorageError>;

    /// Whole-document overwrite.
    async fn save(&self, id: &str, document: &str) -> Result<(), StorageError>;

    async fn is_available(&self) -> bool;
}

/// Tier-3 medium: remote durable document service with push updates.
#[async_trait]
pub trait RemoteDocumentService: Send + Sync {
    /// Whether credentials/endpoint are set up. Checked before every operation.
    fn configured(&self) -> bool;

    async fn load_document(&self, id: &str) -> Result<Option<String>, StorageError>;

    async fn save_document(&self, id: &str, document: &str) -> Result<(), StorageError>;

    /// Receive every document subsequently saved under `id` by any writer.
    async fn subscribe(&self, id: &str) -> Result<broadcast::Receiver<String>, StorageError>;
}
