// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cold-start recovery.
//!
//! Runs once, before anything may mutate the snapshot. Probes sources in
//! trust order and stops at the first usable snapshot:
//!
//! ```text
//! Tier-1 cache ──hit──▶ adopt, backup "auto-load"
//!     │ empty / corrupt / unavailable
//!     ▼
//! Tier-2 local ──hit──▶ adopt, write through to Tier-1
//!     │ empty / corrupt / unavailable
//!     ▼
//! newest non-empty backup ──hit──▶ adopt, write through to Tier-1 and Tier-2
//!     │ none
//!     ▼
//! (no local state)
//! ```
//!
//! Afterwards, if the remote is configured, the local result is reconciled
//! against the remote copy with the coarser [`ConflictPolicy::startup`]
//! thresholds. Any probe may fail; a failure only advances the chain.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backup::{BackupManager, REASON_AUTO_LOAD, REASON_PRE_CLOUD_SYNC};
use crate::conflict::{ConflictPolicy, Resolution, SideSummary};
use crate::snapshot::Snapshot;
use crate::tiers::{CacheTier, LocalTier, RemoteTier};

/// Where the adopted snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    Cache,
    Local,
    Backup { index: usize },
    Remote,
}

impl RecoverySource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Local => "local",
            Self::Backup { .. } => "backup",
            Self::Remote => "remote",
        }
    }
}

/// What the startup remote reconcile did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteReconcile {
    /// Remote unconfigured, unreachable, or holding nothing
    Skipped,
    /// Local won; the engine should push it to the remote
    KeptLocal,
    /// Remote replaced (or supplied) the local snapshot
    AdoptedRemote,
}

/// Result of a recovery run, reported to the caller of `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered {
        source: RecoverySource,
        remote: RemoteReconcile,
    },
    /// Nothing anywhere: the caller should run first-time initialization
    NoPriorState,
}

impl RecoveryOutcome {
    #[must_use]
    pub fn has_state(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

/// Snapshot plus outcome, handed to the engine to install.
#[derive(Debug)]
pub struct Recovery {
    pub snapshot: Option<Snapshot>,
    pub outcome: RecoveryOutcome,
}

pub struct RecoveryOrchestrator<'a> {
    cache: &'a CacheTier,
    local: &'a LocalTier,
    remote: &'a RemoteTier,
    backups: &'a BackupManager,
    policy: ConflictPolicy,
}

impl<'a> RecoveryOrchestrator<'a> {
    pub fn new(
        cache: &'a CacheTier,
        local: &'a LocalTier,
        remote: &'a RemoteTier,
        backups: &'a BackupManager,
    ) -> Self {
        Self {
            cache,
            local,
            remote,
            backups,
            policy: ConflictPolicy::startup(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Recovery {
        let start = Instant::now();
        let (local_source, local) = match self.probe_local().await {
            Some((source, snapshot)) => (Some(source), Some(snapshot)),
            None => (None, None),
        };

        let (snapshot, remote) = self.reconcile(local).await;
        let outcome = match (&snapshot, local_source) {
            (None, _) => RecoveryOutcome::NoPriorState,
            (Some(_), Some(source)) if remote != RemoteReconcile::AdoptedRemote => {
                RecoveryOutcome::Recovered { source, remote }
            }
            (Some(_), _) => RecoveryOutcome::Recovered { source: RecoverySource::Remote, remote },
        };

        let source = match outcome {
            RecoveryOutcome::Recovered { source, .. } => source.as_str(),
            RecoveryOutcome::NoPriorState => "none",
        };
        crate::metrics::record_recovery(source);
        crate::metrics::record_recovery_duration(start.elapsed());
        info!(source, outcome = ?outcome, "Recovery complete");
        Recovery { snapshot, outcome }
    }

    /// Reconcile a local result (or nothing) against the remote copy.
    ///
    /// Adopted remote snapshots are written through to Tier-1 and Tier-2
    /// here; the caller only installs the returned snapshot in memory.
    pub async fn reconcile(&self, local: Option<Snapshot>) -> (Option<Snapshot>, RemoteReconcile) {
        match local {
            Some(local) => {
                let (snapshot, remote) = self.reconcile_with_remote(local).await;
                (Some(snapshot), remote)
            }
            None => match self.remote_only().await {
                Some(snapshot) => (Some(snapshot), RemoteReconcile::AdoptedRemote),
                None => (None, RemoteReconcile::Skipped),
            },
        }
    }

    /// Probe Tier-1, Tier-2, then the backup ring.
    pub async fn probe_local(&self) -> Option<(RecoverySource, Snapshot)> {
        match self.cache.probe() {
            Ok(Some(snapshot)) => {
                info!(density = snapshot.density(), "Recovered snapshot from cache");
                self.backups.create_backup(&snapshot, REASON_AUTO_LOAD);
                return Some((RecoverySource::Cache, snapshot));
            }
            Ok(None) => debug!("Cache empty"),
            Err(e) => warn!(error = %e, "Cache probe failed, trying local store"),
        }

        match self.local.probe().await {
            Ok(Some(snapshot)) => {
                info!(density = snapshot.density(), "Recovered snapshot from local store");
                self.cache.save(&snapshot);
                return Some((RecoverySource::Local, snapshot));
            }
            Ok(None) => debug!("Local store empty"),
            Err(e) => warn!(error = %e, "Local store probe failed, trying backups"),
        }

        if let Some((index, record)) = self.backups.newest_non_empty() {
            info!(
                index,
                reason = %record.reason,
                taken_at = record.timestamp,
                "Recovered snapshot from backup"
            );
            self.cache.save(&record.snapshot);
            self.local.save(&record.snapshot).await;
            return Some((RecoverySource::Backup { index }, record.snapshot));
        }

        debug!("No local state in any tier or backup");
        None
    }

    /// No local state at all: any remote copy beats nothing.
    async fn remote_only(&self) -> Option<Snapshot> {
        if !self.remote.configured() {
            return None;
        }

        let snapshot = self.remote.load().await?;
        info!(density = snapshot.density(), "No local state, adopting remote snapshot");
        self.write_through_local(&snapshot).await;
        Some(snapshot)
    }

    async fn reconcile_with_remote(&self, local: Snapshot) -> (Snapshot, RemoteReconcile) {
        if !self.remote.configured() {
            return (local, RemoteReconcile::Skipped);
        }

        let remote = match self.remote.probe().await {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                debug!("Remote holds no snapshot yet");
                return (local, RemoteReconcile::KeptLocal);
            }
            Err(e) => {
                warn!(error = %e, "Remote unavailable at startup, continuing with local state");
                return (local, RemoteReconcile::Skipped);
            }
        };

        let local_side = SideSummary::of(&local);
        let remote_side = SideSummary::of(&remote);
        if local_side == remote_side {
            debug!("Remote matches local");
            return (local, RemoteReconcile::Skipped);
        }

        let resolution = self.policy.resolve(local_side, remote_side);
        crate::metrics::record_resolution("startup", resolution.as_str());
        info!(
            local_density = local_side.density,
            remote_density = remote_side.density,
            local_modified = local_side.last_modified,
            remote_modified = remote_side.last_modified,
            resolution = resolution.as_str(),
            "Startup reconcile"
        );

        match resolution {
            Resolution::TakeRemote => {
                self.backups.create_backup(&local, REASON_PRE_CLOUD_SYNC);
                self.write_through_local(&remote).await;
                (remote, RemoteReconcile::AdoptedRemote)
            }
            Resolution::TakeLocal => (local, RemoteReconcile::KeptLocal),
        }
    }

    async fn write_through_local(&self, snapshot: &Snapshot) {
        self.cache.save(snapshot);
        self.local.save(snapshot).await;
    }
}
