// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Streak Sync
//!
//! Multi-tier persistence and sync engine for a personal progress tracker.
//!
//! ## Architecture
//!
//! One application-state document (the [`Snapshot`]) is kept durable across
//! three storage tiers of decreasing speed and increasing reach:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PersistenceEngine                       │
//! │  • Owns the single in-memory Snapshot                      │
//! │  • get() / set() / mutate() / update_day()                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (synchronous write-through)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Tier-1: Key-Value Cache                     │
//! │  • File or in-memory, quota-limited                        │
//! │  • Also holds the backup ring                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (background task, ordered)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Tier-2: Local Document Store                 │
//! │  • SQLite via sqlx                                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              (background task + periodic sync, optional)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Tier-3: Remote (Redis)                   │
//! │  • GET/SET document, PUBLISH/SUBSCRIBE pushes              │
//! │  • Circuit breaker, density-biased conflict resolution     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use streak_sync::{PersistenceConfig, PersistenceEngine};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PersistenceConfig {
//!         cache_dir: Some("./data/cache".into()),
//!         sqlite_url: Some("sqlite://./data/progress.db?mode=rwc".into()),
//!         remote_url: Some("redis://localhost:6379".into()),
//!         ..Default::default()
//!     };
//!
//!     let (_tx, rx) = watch::channel(config.clone());
//!     let mut engine = PersistenceEngine::new(config, rx)
//!         .with_on_remote_change(|| println!("another device changed the data"));
//!
//!     // Recover from cache, local store, backups, then reconcile with the remote
//!     let outcome = engine.start().await.expect("engine already started");
//!     if !outcome.has_state() {
//!         engine.init().expect("engine not ready");
//!     }
//!
//!     let engine = Arc::new(engine);
//!     let runner = Arc::clone(&engine);
//!     tokio::spawn(async move { runner.run().await });
//!
//!     engine
//!         .update_today(|day| {
//!             day.habits.insert("stretch".into(), true);
//!         })
//!         .expect("engine not ready");
//!
//!     engine.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: The [`PersistenceEngine`] and its lifecycle
//! - [`tiers`]: Tier adapters that swallow and log medium failures
//! - [`storage`]: Storage media (file, memory, SQLite, Redis)
//! - [`backup`]: Bounded, deduplicated backup ring
//! - [`conflict`]: Local-vs-remote resolution policy
//! - [`recovery`]: Cold-start probe chain
//! - [`sync`]: Sync scheduling state
//! - [`resilience`]: Connect retries and the remote circuit breaker

pub mod config;
pub mod clock;
pub mod snapshot;
pub mod storage;
pub mod tiers;
pub mod backup;
pub mod conflict;
pub mod sync;
pub mod recovery;
pub mod resilience;
pub mod engine;
pub mod metrics;

pub use config::PersistenceConfig;
pub use clock::{Clock, ManualClock, SystemClock};
pub use snapshot::{AppData, DayRecord, Goal, Profile, Snapshot, CURRENT_SCHEMA_VERSION};
pub use storage::traits::{DocumentStore, KeyValueStore, RemoteDocumentService, StorageError};
pub use tiers::{CacheTier, LocalTier, RemoteTier, TierKind};
pub use backup::{BackupManager, BackupRecord};
pub use conflict::{ConflictPolicy, Resolution, SideSummary};
pub use sync::{SyncScheduler, SyncState, SyncTrigger};
pub use recovery::{RecoveryOrchestrator, RecoveryOutcome, RecoverySource, RemoteReconcile};
pub use engine::{
    EngineError, EngineState, EngineStatus, PersistenceEngine, PushOutcome, RemoteChangeCallback,
    SaveReport,
};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError, CircuitStats};
pub use resilience::retry::RetryConfig;
