// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote sync: periodic and manual pushes, incoming pushes, pulls.
//!
//! Incoming pushes are resolved with the live [`ConflictPolicy`]. When the
//! remote wins, the local snapshot is backed up first and the UI callback
//! fires after the swap; when local wins it is pushed straight back.

use tracing::{debug, info, warn};

use crate::backup::REASON_PRE_REALTIME_SYNC;
use crate::conflict::{ConflictPolicy, Resolution, SideSummary};
use crate::recovery::{RecoveryOrchestrator, RemoteReconcile};
use crate::snapshot::Snapshot;
use crate::sync::SyncTrigger;

use super::api::{Cascade, Stamp};
use super::{EngineError, EngineTiers, PersistenceEngine, PushOutcome};

impl PersistenceEngine {
    /// Push the current snapshot to the remote. Non-reentrant: returns
    /// `false` without waiting if another sync is already running.
    pub(super) async fn push(&self, trigger: SyncTrigger) -> bool {
        let Some(tiers) = self.tiers.as_ref() else {
            return false;
        };
        if !tiers.remote.configured() {
            crate::metrics::record_sync_push(trigger.as_str(), "unconfigured");
            return false;
        }
        let Some(_guard) = self.sync.try_begin() else {
            debug!(trigger = trigger.as_str(), "Sync already running, push skipped");
            crate::metrics::record_sync_push(trigger.as_str(), "busy");
            return false;
        };
        let Some(snapshot) = self.get() else {
            crate::metrics::record_sync_push(trigger.as_str(), "empty");
            return false;
        };

        let ticket = tiers.remote.ticket();
        self.sync.note_pushed(snapshot.last_modified, snapshot.density());
        let ok = tiers.remote.save_ordered(&snapshot, ticket).await;
        if ok {
            self.sync.record_success(self.clock.now_ms());
            debug!(
                trigger = trigger.as_str(),
                last_modified = snapshot.last_modified,
                "Pushed snapshot to remote"
            );
        }
        crate::metrics::record_sync_push(trigger.as_str(), if ok { "success" } else { "error" });
        ok
    }

    /// Push now, regardless of the interval gap.
    pub async fn sync_now(&self) -> bool {
        self.push(SyncTrigger::Manual).await
    }

    /// One periodic sync tick: push if the remote is configured and the
    /// last successful sync is older than the configured gap.
    pub async fn tick(&self) -> bool {
        let Some(tiers) = self.tiers.as_ref() else {
            return false;
        };
        if !tiers.remote.configured() {
            return false;
        }

        let min_gap_ms = self.config.read().sync_min_gap_ms();
        if !self.sync.is_due(self.clock.now_ms(), min_gap_ms) {
            debug!("Recent sync, tick skipped");
            return false;
        }
        self.push(SyncTrigger::Interval).await
    }

    /// Handle a snapshot pushed by the remote (raw JSON as received).
    #[tracing::instrument(skip(self, raw), fields(bytes = raw.len()))]
    pub async fn handle_remote_push(&self, raw: &str) -> Result<PushOutcome, EngineError> {
        let tiers = self.tiers()?;
        let remote = match Snapshot::from_json(raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Ignoring undecodable remote push");
                crate::metrics::record_resolution("live", PushOutcome::Rejected.as_str());
                return Ok(PushOutcome::Rejected);
            }
        };
        Ok(self.apply_remote(tiers, remote).await)
    }

    /// Re-read the remote document and resolve it like a push. Used when
    /// pushes were missed.
    pub(super) async fn refresh_from_remote(&self) -> Option<PushOutcome> {
        let tiers = self.tiers.as_ref()?;
        let remote = tiers.remote.load().await?;
        Some(self.apply_remote(tiers, remote).await)
    }

    async fn apply_remote(&self, tiers: &EngineTiers, remote: Snapshot) -> PushOutcome {
        let local = self.get();
        let local_side = local.as_ref().map_or_else(SideSummary::absent, SideSummary::of);
        let remote_side = SideSummary::of(&remote);

        let identical = local.is_some() && local_side == remote_side;
        if identical || self.sync.is_own_echo(remote_side.last_modified, remote_side.density) {
            debug!(last_modified = remote_side.last_modified, "Remote push is an echo, ignored");
            crate::metrics::record_resolution("live", PushOutcome::Echo.as_str());
            return PushOutcome::Echo;
        }

        let resolution = ConflictPolicy::live().resolve(local_side, remote_side);
        crate::metrics::record_resolution("live", resolution.as_str());
        info!(
            local_density = local_side.density,
            remote_density = remote_side.density,
            local_modified = local_side.last_modified,
            remote_modified = remote_side.last_modified,
            resolution = resolution.as_str(),
            "Remote push resolved"
        );

        match resolution {
            Resolution::TakeRemote => {
                if let Some(local) = &local {
                    tiers.backups.create_backup(local, REASON_PRE_REALTIME_SYNC);
                }
                self.commit(tiers, remote, Stamp::Keep, Cascade::Local);
                self.sync.record_success(self.clock.now_ms());
                self.notify_remote_change();
                PushOutcome::AdoptedRemote
            }
            Resolution::TakeLocal => {
                self.push(SyncTrigger::AssertLocal).await;
                PushOutcome::AssertedLocal
            }
        }
    }

    /// Reconcile against the remote copy now, with the startup thresholds.
    ///
    /// Like the reconcile at the end of recovery: a winning remote is backed
    /// up over ("pre-cloud-sync") and adopted, a winning local is pushed.
    #[tracing::instrument(skip(self))]
    pub async fn pull_remote(&self) -> Result<RemoteReconcile, EngineError> {
        let tiers = self.ensure_writable()?;
        let orchestrator =
            RecoveryOrchestrator::new(&tiers.cache, &tiers.local, &tiers.remote, &tiers.backups);

        let (snapshot, outcome) = orchestrator.reconcile(self.get()).await;
        match outcome {
            RemoteReconcile::AdoptedRemote => {
                if let Some(snapshot) = snapshot {
                    crate::metrics::set_snapshot_density(snapshot.density());
                    *self.snapshot.write() = Some(snapshot);
                }
                self.sync.record_success(self.clock.now_ms());
                self.notify_remote_change();
            }
            RemoteReconcile::KeptLocal => {
                self.push(SyncTrigger::Manual).await;
            }
            RemoteReconcile::Skipped => {}
        }
        Ok(outcome)
    }
}
