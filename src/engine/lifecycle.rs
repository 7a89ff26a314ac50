// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine lifecycle management: start, run loop, shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backup::BackupManager;
use crate::config::PersistenceConfig;
use crate::recovery::{RecoveryOrchestrator, RecoveryOutcome, RemoteReconcile};
use crate::storage::file::FileKeyValueStore;
use crate::storage::memory::{InMemoryDocumentStore, InMemoryKeyValueStore};
use crate::storage::redis::RedisRemote;
use crate::storage::sql::SqliteDocumentStore;
use crate::storage::traits::{DocumentStore, KeyValueStore, RemoteDocumentService};
use crate::sync::SyncTrigger;
use crate::tiers::{CacheTier, LocalTier, RemoteTier};

use super::{EngineError, EngineState, EngineTiers, PersistenceEngine};

enum PushEvent {
    Document(String),
    /// The subscription dropped this many pushes
    Lagged(u64),
}

/// Next event from the push subscription; pends forever without one.
async fn next_push(rx: &mut Option<broadcast::Receiver<String>>) -> Option<PushEvent> {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    match receiver.recv().await {
        Ok(raw) => Some(PushEvent::Document(raw)),
        Err(RecvError::Lagged(skipped)) => Some(PushEvent::Lagged(skipped)),
        Err(RecvError::Closed) => {
            warn!("Remote push subscription closed, continuing with periodic sync only");
            *rx = None;
            None
        }
    }
}

fn sync_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl PersistenceEngine {
    /// Start the engine: connect the tiers and recover the snapshot.
    ///
    /// Startup flow:
    /// 1. Build Tier-1/2/3 from injected mediums or config. A tier that
    ///    cannot be opened degrades (in-memory Tier-2, no remote) rather
    ///    than failing startup.
    /// 2. Subscribe to remote pushes, so none are lost during recovery.
    /// 3. Probe cache → local store → backups, then reconcile with the remote.
    /// 4. Ready! Push local back if it won the reconcile.
    ///
    /// `RecoveryOutcome::NoPriorState` means nothing was found anywhere;
    /// call [`init()`](Self::init) to create the first snapshot.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self) -> Result<RecoveryOutcome, EngineError> {
        let state = self.state();
        if state != EngineState::Created {
            return Err(EngineError::AlreadyStarted(state));
        }

        let startup_start = Instant::now();
        info!("Starting persistence engine...");
        self.set_state(EngineState::Recovering);

        let config = self.config.read().clone();
        let tiers = self.connect_tiers(&config).await;
        *self.push_rx.get_mut() = tiers.remote.subscribe().await;

        let recovery =
            RecoveryOrchestrator::new(&tiers.cache, &tiers.local, &tiers.remote, &tiers.backups)
                .recover()
                .await;
        if let Some(snapshot) = &recovery.snapshot {
            crate::metrics::set_snapshot_density(snapshot.density());
        }
        *self.snapshot.get_mut() = recovery.snapshot;
        self.tiers = Some(tiers);

        self.set_state(EngineState::Ready);
        if let RecoveryOutcome::Recovered { remote: RemoteReconcile::KeptLocal, .. } = recovery.outcome {
            self.push(SyncTrigger::Startup).await;
        }

        info!(
            outcome = ?recovery.outcome,
            elapsed_ms = startup_start.elapsed().as_millis() as u64,
            "Persistence engine ready"
        );
        Ok(recovery.outcome)
    }

    async fn connect_tiers(&self, config: &PersistenceConfig) -> EngineTiers {
        let cache_store: Arc<dyn KeyValueStore> = match (&self.cache_store, &config.cache_dir) {
            (Some(store), _) => Arc::clone(store),
            (None, Some(dir)) => Arc::new(FileKeyValueStore::open(dir, config.cache_max_bytes)),
            (None, None) => {
                debug!("No cache_dir configured, Tier-1 is in-memory");
                Arc::new(InMemoryKeyValueStore::new(config.cache_max_bytes))
            }
        };

        let document_store: Arc<dyn DocumentStore> = match (&self.document_store, &config.sqlite_url) {
            (Some(store), _) => Arc::clone(store),
            (None, Some(url)) => match SqliteDocumentStore::new(url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(error = %e, "Local store unavailable, Tier-2 falls back to in-memory");
                    Arc::new(InMemoryDocumentStore::new())
                }
            },
            (None, None) => {
                debug!("No sqlite_url configured, Tier-2 is in-memory");
                Arc::new(InMemoryDocumentStore::new())
            }
        };

        let remote_service: Option<Arc<dyn RemoteDocumentService>> =
            match (&self.remote_service, &config.remote_url) {
                (Some(service), _) => Some(Arc::clone(service)),
                (None, Some(url)) => {
                    match RedisRemote::with_prefix(url, config.remote_prefix.as_deref()).await {
                        Ok(remote) => Some(Arc::new(remote)),
                        Err(e) => {
                            warn!(error = %e, "Remote unreachable at startup, running local-only");
                            None
                        }
                    }
                }
                (None, None) => {
                    info!("No remote configured, running local-only");
                    None
                }
            };

        let backups = BackupManager::open(
            Arc::clone(&cache_store),
            config.backup_key.clone(),
            config.backup_capacity,
            config.backup_dedup_ms(),
            Arc::clone(&self.clock),
        );

        EngineTiers {
            cache: CacheTier::new(cache_store, config.snapshot_key.clone()),
            local: Arc::new(LocalTier::new(document_store, config.document_id.clone())),
            remote: Arc::new(RemoteTier::with_circuit(
                remote_service,
                config.document_id.clone(),
                self.circuit.clone(),
            )),
            backups,
        }
    }

    /// Run the main event loop until [`shutdown()`](Self::shutdown).
    ///
    /// Drives the periodic sync tick, applies incoming remote pushes,
    /// picks up config changes and reaps finished background writes.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) {
        let state = self.state();
        if !state.accepts_writes() {
            warn!(state = %state, "Run loop needs a started engine");
            return;
        }
        self.set_state(EngineState::Running);

        let mut period = self.config.read().sync_interval();
        let mut ticker = sync_ticker(period);
        let mut pushes = self.push_rx.lock().await.take();
        let mut config_rx = self.config_rx.lock().await;
        let mut state_rx = self.state_rx.clone();
        info!(
            sync_interval_secs = period.as_secs(),
            subscribed = pushes.is_some(),
            "Persistence engine running"
        );

        loop {
            tokio::select! {
                Ok(()) = config_rx.changed() => {
                    let new_config = config_rx.borrow_and_update().clone();
                    info!(
                        sync_interval_secs = new_config.sync_interval_secs,
                        sync_min_gap_secs = new_config.sync_min_gap_secs,
                        "Config updated"
                    );
                    let new_period = new_config.sync_interval();
                    *self.config.write() = new_config;
                    if new_period != period {
                        period = new_period;
                        ticker = sync_ticker(period);
                    }
                }

                Some(event) = next_push(&mut pushes) => match event {
                    PushEvent::Document(raw) => {
                        if let Ok(outcome) = self.handle_remote_push(&raw).await {
                            debug!(outcome = outcome.as_str(), "Remote push handled");
                        }
                    }
                    PushEvent::Lagged(skipped) => {
                        warn!(skipped, "Missed remote pushes, re-reading remote document");
                        self.refresh_from_remote().await;
                    }
                },

                _ = ticker.tick() => {
                    self.tick().await;
                    self.reap_writes();
                }

                Ok(()) = state_rx.changed() => {
                    if *state_rx.borrow_and_update() == EngineState::ShuttingDown {
                        break;
                    }
                }
            }
        }

        // Hand the subscription back in case the caller inspects it after shutdown
        *self.push_rx.lock().await = pushes;
        info!("Run loop stopped");
    }

    /// Graceful shutdown: stop the run loop, wait for background writes
    /// and make a final push if the remote is configured.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let shutdown_start = Instant::now();
        info!("Initiating persistence engine shutdown...");
        self.set_state(EngineState::ShuttingDown);

        let failed = self.flush().await;
        let pushed = self.push(SyncTrigger::Shutdown).await;

        info!(
            failed_writes = failed,
            final_push = pushed,
            elapsed_ms = shutdown_start.elapsed().as_millis() as u64,
            "Persistence engine shutdown complete"
        );
    }
}
