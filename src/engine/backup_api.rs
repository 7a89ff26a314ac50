// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backup API: take, list and restore recovery points.

use tracing::{debug, info};

use crate::backup::{BackupRecord, REASON_PRE_RESTORE};
use crate::sync::SyncTrigger;

use super::api::{Cascade, Stamp};
use super::{EngineError, PersistenceEngine, SaveReport};

impl PersistenceEngine {
    /// Back up the current snapshot.
    ///
    /// `true` if a backup was written or skipped by the dedup window;
    /// `false` if there is nothing to back up or the ring could not be saved.
    pub fn create_backup(&self, reason: &str) -> bool {
        let Ok(tiers) = self.tiers() else {
            return false;
        };
        let Some(snapshot) = self.get() else {
            debug!(reason, "No snapshot loaded, nothing to back up");
            return false;
        };
        tiers.backups.create_backup(&snapshot, reason)
    }

    /// All backups, newest first.
    #[must_use]
    pub fn list_backups(&self) -> Vec<BackupRecord> {
        self.tiers
            .as_ref()
            .map(|tiers| tiers.backups.list_backups())
            .unwrap_or_default()
    }

    /// Replace the live snapshot with backup `index`, persist it through
    /// Tier-1 and Tier-2, then push it to the remote.
    ///
    /// The state being replaced is backed up first (subject to the dedup
    /// window), so a restore can itself be undone.
    ///
    /// The backup's own `last_modified` is kept, so restoring the same
    /// index twice leaves an identical snapshot.
    #[tracing::instrument(skip(self))]
    pub async fn restore_from_backup(&self, index: usize) -> Result<SaveReport, EngineError> {
        let tiers = self.ensure_writable()?;
        let record = tiers.backups.get(index).ok_or(EngineError::BackupIndex {
            index,
            len: tiers.backups.len(),
        })?;

        info!(
            index,
            reason = %record.reason,
            taken_at = record.timestamp,
            density = record.snapshot.density(),
            "Restoring from backup"
        );
        if let Some(current) = self.get() {
            tiers.backups.create_backup(&current, REASON_PRE_RESTORE);
        }
        let report = self.commit(tiers, record.snapshot, Stamp::Keep, Cascade::Local);
        self.push(SyncTrigger::Restore).await;
        Ok(report)
    }
}
