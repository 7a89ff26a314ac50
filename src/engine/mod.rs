// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persistence engine.
//!
//! The [`PersistenceEngine`] owns the single authoritative [`Snapshot`] and
//! ties the other components together:
//! - Tier-1 key-value cache (synchronous write-through)
//! - Tier-2 local document store and Tier-3 remote (background writes)
//! - Backup ring for manual and automatic recovery points
//! - Conflict resolution against remote pushes
//! - Periodic remote sync
//!
//! # Lifecycle
//!
//! ```text
//! Created → Recovering → Ready → Running → ShuttingDown
//! ```
//!
//! Mutations are rejected until recovery has finished.
//!
//! # Example
//!
//! ```rust
//! use streak_sync::{EngineState, PersistenceConfig, PersistenceEngine};
//! use tokio::sync::watch;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = PersistenceConfig::default();
//! let (_tx, rx) = watch::channel(config.clone());
//! let mut engine = PersistenceEngine::new(config, rx);
//! assert_eq!(engine.state(), EngineState::Created);
//!
//! let outcome = engine.start().await.unwrap();
//! if !outcome.has_state() {
//!     engine.init().unwrap();
//! }
//!
//! engine.update_day("2026-10-18", |day| day.workout_done = true).unwrap();
//! assert_eq!(engine.get().unwrap().density(), 1);
//!
//! engine.shutdown().await;
//! # }
//! ```

mod api;
mod backup_api;
mod lifecycle;
mod sync_api;
mod types;

pub use types::{EngineError, EngineState, EngineStatus, PushOutcome, SaveReport};

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinSet;

use crate::backup::BackupManager;
use crate::clock::{Clock, SystemClock};
use crate::config::PersistenceConfig;
use crate::resilience::circuit_breaker::CircuitConfig;
use crate::snapshot::Snapshot;
use crate::storage::traits::{DocumentStore, KeyValueStore, RemoteDocumentService};
use crate::sync::SyncScheduler;
use crate::tiers::{CacheTier, LocalTier, RemoteTier, TierKind};

/// Outcome of one background tier write.
pub(super) type WriteResult = (TierKind, bool);

/// UI refresh hook, invoked after a remote snapshot replaces local state.
pub type RemoteChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Tier adapters and the backup ring, built once by `start()`.
pub(super) struct EngineTiers {
    pub(super) cache: CacheTier,
    pub(super) local: Arc<LocalTier>,
    pub(super) remote: Arc<RemoteTier>,
    pub(super) backups: BackupManager,
}

/// Multi-tier persistence engine.
///
/// # Thread Safety
///
/// The engine is `Send + Sync`. Share it behind an `Arc` once started so
/// [`run()`](Self::run) can drive sync in one task while others mutate.
pub struct PersistenceEngine {
    /// Configuration (updated at runtime via the watch channel)
    pub(super) config: RwLock<PersistenceConfig>,

    /// Runtime config updates, consumed by the run loop
    pub(super) config_rx: Mutex<watch::Receiver<PersistenceConfig>>,

    /// Engine state (broadcast to watchers)
    pub(super) state: watch::Sender<EngineState>,

    /// Engine state receiver (for internal use)
    pub(super) state_rx: watch::Receiver<EngineState>,

    pub(super) clock: Arc<dyn Clock>,

    /// The canonical snapshot. Nothing else holds a mutable copy.
    pub(super) snapshot: RwLock<Option<Snapshot>>,

    /// Present once `start()` has connected the tiers
    pub(super) tiers: Option<EngineTiers>,

    pub(super) sync: Arc<SyncScheduler>,

    /// In-flight Tier-2/Tier-3 writes, reaped by the run loop and `flush()`
    pub(super) writes: parking_lot::Mutex<JoinSet<WriteResult>>,

    /// Remote push subscription, taken by the run loop
    pub(super) push_rx: Mutex<Option<broadcast::Receiver<String>>>,

    pub(super) on_remote_change: Option<RemoteChangeCallback>,

    /// Injected mediums; anything left None is built from config in `start()`
    pub(super) cache_store: Option<Arc<dyn KeyValueStore>>,
    pub(super) document_store: Option<Arc<dyn DocumentStore>>,
    pub(super) remote_service: Option<Arc<dyn RemoteDocumentService>>,
    pub(super) circuit: CircuitConfig,
}

impl PersistenceEngine {
    /// Create a new engine.
    ///
    /// The engine starts in `Created` state. Call [`start()`](Self::start)
    /// to connect the tiers and run recovery.
    pub fn new(config: PersistenceConfig, config_rx: watch::Receiver<PersistenceConfig>) -> Self {
        let (state_tx, state_rx) = watch::channel(EngineState::Created);

        Self {
            config: RwLock::new(config),
            config_rx: Mutex::new(config_rx),
            state: state_tx,
            state_rx,
            clock: Arc::new(SystemClock),
            snapshot: RwLock::new(None),
            tiers: None,
            sync: Arc::new(SyncScheduler::new()),
            writes: parking_lot::Mutex::new(JoinSet::new()),
            push_rx: Mutex::new(None),
            on_remote_change: None,
            cache_store: None,
            document_store: None,
            remote_service: None,
            circuit: CircuitConfig::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use this Tier-1 medium instead of building one from `cache_dir`.
    #[must_use]
    pub fn with_cache_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Use this Tier-2 medium instead of building one from `sqlite_url`.
    #[must_use]
    pub fn with_document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.document_store = Some(store);
        self
    }

    /// Use this Tier-3 service instead of connecting to `remote_url`.
    #[must_use]
    pub fn with_remote(mut self, service: Arc<dyn RemoteDocumentService>) -> Self {
        self.remote_service = Some(service);
        self
    }

    #[must_use]
    pub fn with_circuit(mut self, circuit: CircuitConfig) -> Self {
        self.circuit = circuit;
        self
    }

    /// Called after a remote snapshot replaces local state, so the UI can re-render.
    #[must_use]
    pub fn with_on_remote_change(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_remote_change = Some(Arc::new(callback));
        self
    }

    /// Get current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Check if the engine accepts mutations.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().accepts_writes()
    }

    /// Current configuration (including runtime updates).
    #[must_use]
    pub fn config(&self) -> PersistenceConfig {
        self.config.read().clone()
    }

    pub(super) fn set_state(&self, state: EngineState) {
        self.state.send_replace(state);
        crate::metrics::set_engine_state(state.code());
    }

    pub(super) fn tiers(&self) -> Result<&EngineTiers, EngineError> {
        self.tiers.as_ref().ok_or_else(|| EngineError::NotReady(self.state()))
    }

    pub(super) fn ensure_writable(&self) -> Result<&EngineTiers, EngineError> {
        let state = self.state();
        if !state.accepts_writes() {
            return Err(EngineError::NotReady(state));
        }
        self.tiers()
    }

    pub(super) fn notify_remote_change(&self) {
        if let Some(callback) = &self.on_remote_change {
            callback();
        }
    }

    /// Collect engine state into an [`EngineStatus`]. No I/O.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let (last_modified, density) = match self.snapshot.read().as_ref() {
            Some(snapshot) => (Some(snapshot.last_modified), snapshot.density()),
            None => (None, 0),
        };
        let tiers = self.tiers.as_ref();

        EngineStatus {
            state: self.state(),
            sync_state: self.sync.state(),
            loaded: last_modified.is_some(),
            last_modified,
            density,
            backups: tiers.map_or(0, |t| t.backups.len()),
            remote_configured: tiers.is_some_and(|t| t.remote.configured()),
            last_sync_ms: self.sync.last_success_ms(),
            pending_writes: self.writes.lock().len(),
        }
    }
}
