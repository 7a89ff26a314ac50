// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the persistence engine.
//!
//! # Example
//!
//! ```
//! use streak_sync::PersistenceConfig;
//!
//! // Local-only defaults: in-memory cache, in-memory local store, no remote
//! let config = PersistenceConfig::default();
//! assert_eq!(config.backup_capacity, 10);
//! assert!(config.remote_url.is_none());
//!
//! // Fully configured
//! let config = PersistenceConfig {
//!     cache_dir: Some("./data/cache".into()),
//!     sqlite_url: Some("sqlite://./data/progress.db?mode=rwc".into()),
//!     remote_url: Some("redis://localhost:6379".into()),
//!     sync_interval_secs: 60,
//!     ..Default::default()
//! };
//! assert_eq!(config.sync_min_gap_secs, 25);
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the persistence engine.
///
/// Every field has a default, so an empty config runs fully local with
/// in-memory tiers. Set `cache_dir` and `sqlite_url` for real durability
/// and `remote_url` to enable remote sync.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for the Tier-1 key-value cache (None = in-memory)
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Tier-1 capacity in bytes; writes beyond it fail with QuotaExceeded (default: 5 MiB)
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: usize,

    /// Tier-2 SQLite URL, e.g. "sqlite://progress.db?mode=rwc" (None = in-memory document store)
    #[serde(default)]
    pub sqlite_url: Option<String>,

    /// Tier-3 Redis URL (None = remote sync unconfigured)
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Optional key prefix for the remote namespace (e.g. "streak:")
    #[serde(default)]
    pub remote_prefix: Option<String>,

    /// Identifier of the snapshot document in Tier-2 and Tier-3
    #[serde(default = "default_document_id")]
    pub document_id: String,

    /// Tier-1 key holding the live snapshot
    #[serde(default = "default_snapshot_key")]
    pub snapshot_key: String,

    /// Tier-1 key holding the backup ring
    #[serde(default = "default_backup_key")]
    pub backup_key: String,

    /// Max backups retained, newest first
    #[serde(default = "default_backup_capacity")]
    pub backup_capacity: usize,

    /// Backups requested within this window of the newest one are skipped
    #[serde(default = "default_backup_dedup_secs")]
    pub backup_dedup_secs: u64,

    /// Periodic remote sync tick
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// A tick only pushes if the last successful sync is older than this
    #[serde(default = "default_sync_min_gap_secs")]
    pub sync_min_gap_secs: u64,
}

fn default_cache_max_bytes() -> usize { 5 * 1024 * 1024 } // 5 MiB
fn default_document_id() -> String { "progress".to_string() }
fn default_snapshot_key() -> String { "app_state".to_string() }
fn default_backup_key() -> String { "app_state_backups".to_string() }
fn default_backup_capacity() -> usize { 10 }
fn default_backup_dedup_secs() -> u64 { 300 }
fn default_sync_interval_secs() -> u64 { 30 }
fn default_sync_min_gap_secs() -> u64 { 25 }

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_max_bytes: default_cache_max_bytes(),
            sqlite_url: None,
            remote_url: None,
            remote_prefix: None,
            document_id: default_document_id(),
            snapshot_key: default_snapshot_key(),
            backup_key: default_backup_key(),
            backup_capacity: default_backup_capacity(),
            backup_dedup_secs: default_backup_dedup_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            sync_min_gap_secs: default_sync_min_gap_secs(),
        }
    }
}

impl PersistenceConfig {
    /// Backup deduplication window in milliseconds.
    #[must_use]
    pub fn backup_dedup_ms(&self) -> i64 {
        (self.backup_dedup_secs as i64).saturating_mul(1000)
    }

    /// Minimum gap between periodic pushes in milliseconds.
    #[must_use]
    pub fn sync_min_gap_ms(&self) -> i64 {
        (self.sync_min_gap_secs as i64).saturating_mul(1000)
    }

    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        // A zero interval would make tokio::time::interval panic
        Duration::from_secs(self.sync_interval_secs.max(1))
    }
}
