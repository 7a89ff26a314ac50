// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot API: reads, mutations, and the write-through cascade.
//!
//! Every write lands in memory first, then Tier-1 synchronously, then is
//! queued for Tier-2 and Tier-3 as background tasks. A reader calling
//! [`get()`](PersistenceEngine::get) right after a write always sees it.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::snapshot::{DayRecord, Goal, Profile, Snapshot};
use crate::sync::SyncTrigger;
use crate::tiers::TierKind;

use super::{EngineError, EngineTiers, PersistenceEngine, SaveReport, WriteResult};

/// How `commit` treats `last_modified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Stamp {
    /// Local mutation: stamp with the clock, never going backwards
    Now,
    /// Adopted or restored snapshot: keep its own stamp
    Keep,
}

/// Which tiers `commit` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Cascade {
    /// Tier-1, Tier-2 and Tier-3
    Full,
    /// Tier-1 and Tier-2; the caller handles the remote itself
    Local,
}

/// A snapshot installed in memory and Tier-1, awaiting its background writes.
struct PendingWrite {
    snapshot: Snapshot,
    cache_saved: bool,
    local_ticket: u64,
    remote_ticket: Option<u64>,
}

/// `YYYY-MM-DD` in the local timezone for an epoch-millis instant.
pub(super) fn local_date(now_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(now_ms)
        .unwrap_or_default()
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d")
        .to_string()
}

impl PersistenceEngine {
    /// Current snapshot (a copy), or None before init / after reset.
    #[must_use]
    pub fn get(&self) -> Option<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Replace the snapshot and persist it through every tier.
    ///
    /// `last_modified` is stamped here: `max(now, previous + 1)`, so stamps
    /// are strictly increasing even if the wall clock steps backwards.
    #[tracing::instrument(skip(self, snapshot))]
    pub fn set(&self, snapshot: Snapshot) -> Result<SaveReport, EngineError> {
        let tiers = self.ensure_writable()?;
        Ok(self.commit(tiers, snapshot, Stamp::Now, Cascade::Full))
    }

    /// Apply `f` to the current snapshot and persist the result like [`set`](Self::set).
    ///
    /// `f` runs while the snapshot lock is held, so concurrent mutations
    /// each see the previous one's result. It must not call back into the engine.
    pub fn mutate<F>(&self, f: F) -> Result<SaveReport, EngineError>
    where
        F: FnOnce(&mut Snapshot),
    {
        let tiers = self.ensure_writable()?;
        let pending = {
            let mut current = self.snapshot.write();
            let mut snapshot = current.clone().ok_or(EngineError::NoSnapshot)?;
            f(&mut snapshot);
            Self::install(tiers, &mut current, snapshot, &*self.clock, Stamp::Now, Cascade::Full)
        };
        Ok(self.dispatch(tiers, pending))
    }

    /// Edit the record for `date` (`YYYY-MM-DD`), creating it if missing.
    pub fn update_day<F>(&self, date: &str, f: F) -> Result<SaveReport, EngineError>
    where
        F: FnOnce(&mut DayRecord),
    {
        self.mutate(|snapshot| f(snapshot.data.day_mut(date)))
    }

    /// Edit today's record, by the engine clock in local time.
    pub fn update_today<F>(&self, f: F) -> Result<SaveReport, EngineError>
    where
        F: FnOnce(&mut DayRecord),
    {
        let today = self.today();
        self.update_day(&today, f)
    }

    pub fn update_profile<F>(&self, f: F) -> Result<SaveReport, EngineError>
    where
        F: FnOnce(&mut Profile),
    {
        self.mutate(|snapshot| f(&mut snapshot.data.profile))
    }

    pub fn update_goals<F>(&self, f: F) -> Result<SaveReport, EngineError>
    where
        F: FnOnce(&mut Vec<Goal>),
    {
        self.mutate(|snapshot| f(&mut snapshot.data.goals))
    }

    /// Today's date key.
    #[must_use]
    pub fn today(&self) -> String {
        local_date(self.clock.now_ms())
    }

    /// First-run initialization: install and persist an empty snapshot.
    ///
    /// Returns `false` (and changes nothing) if a snapshot is already loaded.
    pub fn init(&self) -> Result<bool, EngineError> {
        self.ensure_writable()?;
        if self.snapshot.read().is_some() {
            debug!("Snapshot already loaded, init skipped");
            return Ok(false);
        }

        let report = self.set(Snapshot::new(self.clock.now_ms()))?;
        info!(cache_saved = report.cache_saved, "Initialized first-run snapshot");
        Ok(true)
    }

    /// Clear the Tier-1 copy and drop the in-memory snapshot.
    ///
    /// Tier-2, Tier-3 and the backup ring are left alone; a later restart
    /// recovers from them.
    pub fn reset(&self) -> Result<(), EngineError> {
        let tiers = self.tiers()?;
        let cleared = tiers.cache.clear();
        *self.snapshot.write() = None;
        crate::metrics::set_snapshot_density(0);
        info!(cache_cleared = cleared, "Snapshot reset");
        Ok(())
    }

    /// Install `snapshot` in memory and cascade it to the tiers.
    pub(super) fn commit(
        &self,
        tiers: &EngineTiers,
        snapshot: Snapshot,
        stamp: Stamp,
        cascade: Cascade,
    ) -> SaveReport {
        let pending = {
            let mut current = self.snapshot.write();
            Self::install(tiers, &mut current, snapshot, &*self.clock, stamp, cascade)
        };
        self.dispatch(tiers, pending)
    }

    /// Stamp, install, Tier-1 write and ticket issue. Runs under the
    /// snapshot write lock so concurrent commits are ordered the same way
    /// in every tier.
    fn install(
        tiers: &EngineTiers,
        current: &mut Option<Snapshot>,
        mut snapshot: Snapshot,
        clock: &dyn Clock,
        stamp: Stamp,
        cascade: Cascade,
    ) -> PendingWrite {
        if stamp == Stamp::Now {
            let now = clock.now_ms();
            snapshot.last_modified = match current.as_ref() {
                Some(previous) => now.max(previous.last_modified + 1),
                None => now,
            };
        }
        *current = Some(snapshot.clone());

        let cache_saved = tiers.cache.save(&snapshot);
        let local_ticket = tiers.local.ticket();
        let remote_ticket = (cascade == Cascade::Full && tiers.remote.configured())
            .then(|| tiers.remote.ticket());
        PendingWrite { snapshot, cache_saved, local_ticket, remote_ticket }
    }

    /// Queue the Tier-2 and Tier-3 writes for an installed snapshot.
    fn dispatch(&self, tiers: &EngineTiers, pending: PendingWrite) -> SaveReport {
        let PendingWrite { snapshot, cache_saved, local_ticket, remote_ticket } = pending;
        let density = snapshot.density();
        crate::metrics::set_snapshot_density(density);
        let last_modified = snapshot.last_modified;
        let mut queued = 0;

        if let Some(ticket) = remote_ticket {
            self.sync.note_pushed(last_modified, density);
            let remote = Arc::clone(&tiers.remote);
            let sync = Arc::clone(&self.sync);
            let clock = Arc::clone(&self.clock);
            let pushed = snapshot.clone();
            let spawned = self.spawn_write(async move {
                let ok = remote.save_ordered(&pushed, ticket).await;
                if ok {
                    sync.record_success(clock.now_ms());
                }
                let status = if ok { "success" } else { "error" };
                crate::metrics::record_sync_push(SyncTrigger::Mutation.as_str(), status);
                (TierKind::Remote, ok)
            });
            queued += usize::from(spawned);
        }

        let local = Arc::clone(&tiers.local);
        let spawned = self.spawn_write(async move {
            let ok = local.save_ordered(&snapshot, local_ticket).await;
            (TierKind::Local, ok)
        });
        queued += usize::from(spawned);

        debug!(last_modified, density, cache_saved, queued, "Snapshot committed");
        SaveReport { last_modified, cache_saved, queued }
    }

    fn spawn_write<F>(&self, write: F) -> bool
    where
        F: Future<Output = WriteResult> + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, background tier write dropped");
            return false;
        };

        let mut writes = self.writes.lock();
        writes.spawn_on(write, &handle);
        crate::metrics::set_pending_writes(writes.len());
        true
    }

    fn observe_write(result: Result<WriteResult, JoinError>) -> bool {
        match result {
            Ok((_, true)) => true,
            Ok((tier, false)) => {
                // The adapter already logged the cause
                debug!(tier = %tier, "Background write reported failure");
                false
            }
            Err(e) => {
                error!(error = %e, "Background write task did not complete");
                false
            }
        }
    }

    /// Collect finished background writes without waiting. Returns the number that failed.
    pub fn reap_writes(&self) -> usize {
        let mut writes = self.writes.lock();
        let mut failed = 0;
        while let Some(result) = writes.try_join_next() {
            if !Self::observe_write(result) {
                failed += 1;
            }
        }
        crate::metrics::set_pending_writes(writes.len());
        failed
    }

    /// Wait for every outstanding background write. Returns the number that failed.
    pub async fn flush(&self) -> usize {
        let mut failed = 0;
        loop {
            let mut batch = std::mem::take(&mut *self.writes.lock());
            if batch.is_empty() {
                break;
            }
            while let Some(result) = batch.join_next().await {
                if !Self::observe_write(result) {
                    failed += 1;
                }
            }
        }
        crate::metrics::set_pending_writes(0);
        if failed > 0 {
            warn!(failed, "Some background writes failed during flush");
        }
        failed
    }
}
