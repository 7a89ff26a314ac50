// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded, time-deduplicated backup ring.
//!
//! Backups are whole-snapshot copies taken before risky operations
//! (restores, incoming remote overwrites, startup loads). The ring keeps
//! at most `capacity` records, newest first, and skips a new backup when
//! the newest one is younger than the dedup window so a burst of saves
//! does not churn the ring.
//!
//! The ring is stored as one JSON array under a fixed key in the Tier-1
//! medium. It is a safety net, not a critical path: every failure here is
//! reported as `false` and logged, never raised.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::snapshot::Snapshot;
use crate::storage::traits::{KeyValueStore, StorageError};

/// Cache copy loaded at startup
pub const REASON_AUTO_LOAD: &str = "auto-load";
/// Before a cold remote copy replaces local state
pub const REASON_PRE_CLOUD_SYNC: &str = "pre-cloud-sync";
/// Before a live remote push replaces local state
pub const REASON_PRE_REALTIME_SYNC: &str = "pre-realtime-sync";
/// Before a restore replaces the live snapshot
pub const REASON_PRE_RESTORE: &str = "pre-restore";

/// One historical snapshot. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Epoch millis when the backup was taken
    pub timestamp: i64,
    /// Free-text cause, e.g. "pre-realtime-sync"
    pub reason: String,
    pub snapshot: Snapshot,
}

pub struct BackupManager {
    store: Arc<dyn KeyValueStore>,
    key: String,
    capacity: usize,
    dedup_window_ms: i64,
    clock: Arc<dyn Clock>,
    /// Newest first; mirrors what is persisted
    ring: Mutex<Vec<BackupRecord>>,
}

impl BackupManager {
    /// Open the ring stored under `key`, starting empty if it is missing or unreadable.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        capacity: usize,
        dedup_window_ms: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let key = key.into();
        let capacity = capacity.max(1);
        let ring = match Self::read_ring(store.as_ref(), &key) {
            Ok(mut ring) => {
                ring.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                ring.truncate(capacity);
                ring
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Backup ring unreadable, starting empty");
                Vec::new()
            }
        };

        debug!(key = %key, backups = ring.len(), "Backup ring opened");
        crate::metrics::set_backup_count(ring.len());
        Self {
            store,
            key,
            capacity,
            dedup_window_ms,
            clock,
            ring: Mutex::new(ring),
        }
    }

    fn read_ring(store: &dyn KeyValueStore, key: &str) -> Result<Vec<BackupRecord>, StorageError> {
        match store.get(key)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Take a backup of `snapshot`.
    ///
    /// Returns `true` when a record was written or when the request fell
    /// inside the dedup window (a no-op success). Returns `false` only if
    /// the ring could not be encoded or persisted.
    pub fn create_backup(&self, snapshot: &Snapshot, reason: &str) -> bool {
        let now = self.clock.now_ms();
        let mut ring = self.ring.lock();

        if let Some(newest) = ring.first() {
            let age = now - newest.timestamp;
            if age < self.dedup_window_ms {
                debug!(reason, age_ms = age, "Backup skipped, newest is inside dedup window");
                crate::metrics::record_backup("deduplicated");
                return true;
            }
        }

        let mut candidate = Vec::with_capacity(self.capacity);
        candidate.push(BackupRecord {
            timestamp: now,
            reason: reason.to_string(),
            snapshot: snapshot.clone(),
        });
        candidate.extend(ring.iter().take(self.capacity - 1).cloned());

        match self.persist(&mut candidate) {
            Ok(()) => {
                info!(reason, backups = candidate.len(), "Backup created");
                crate::metrics::record_backup("created");
                crate::metrics::set_backup_count(candidate.len());
                *ring = candidate;
                true
            }
            Err(e) => {
                warn!(reason, error = %e, "Backup failed");
                crate::metrics::record_backup("failed");
                false
            }
        }
    }

    /// Write the ring, dropping the oldest records while the medium is over quota.
    fn persist(&self, ring: &mut Vec<BackupRecord>) -> Result<(), StorageError> {
        loop {
            let json = serde_json::to_string(&*ring)?;
            match self.store.set(&self.key, &json) {
                Err(StorageError::QuotaExceeded { .. }) if ring.len() > 1 => {
                    let dropped = ring.pop();
                    debug!(
                        dropped_at = dropped.map(|r| r.timestamp),
                        remaining = ring.len(),
                        "Backup ring over quota, dropping oldest"
                    );
                }
                other => return other,
            }
        }
    }

    /// All backups, newest first.
    #[must_use]
    pub fn list_backups(&self) -> Vec<BackupRecord> {
        self.ring.lock().clone()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<BackupRecord> {
        self.ring.lock().get(index).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    /// The newest backup whose snapshot holds any user data.
    #[must_use]
    pub fn newest_non_empty(&self) -> Option<(usize, BackupRecord)> {
        self.ring
            .lock()
            .iter()
            .enumerate()
            .find(|(_, record)| record.snapshot.has_schema_marker() && record.snapshot.density() > 0)
            .map(|(index, record)| (index, record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::memory::InMemoryKeyValueStore;

    const FIVE_MINUTES_MS: i64 = 5 * 60 * 1000;

    fn snapshot(runs: usize) -> Snapshot {
        let mut snapshot = Snapshot::new(1);
        for _ in 0..runs {
            snapshot.data.running_log.push(Default::default());
        }
        snapshot
    }

    fn manager(clock: Arc<ManualClock>) -> (Arc<InMemoryKeyValueStore>, BackupManager) {
        let store = Arc::new(InMemoryKeyValueStore::new(1 << 20));
        let manager = BackupManager::open(store.clone(), "backups", 10, FIVE_MINUTES_MS, clock);
        (store, manager)
    }

    #[test]
    fn test_dedup_window() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (_, backups) = manager(clock.clone());

        assert!(backups.create_backup(&snapshot(1), "first"));
        clock.advance_secs(60);
        assert!(backups.create_backup(&snapshot(2), "second"));
        assert_eq!(backups.len(), 1);
        assert_eq!(backups.list_backups()[0].reason, "first");

        clock.advance_secs(5 * 60);
        assert!(backups.create_backup(&snapshot(3), "third"));
        assert_eq!(backups.len(), 2);
        assert_eq!(backups.list_backups()[0].reason, "third");
    }

    #[test]
    fn test_ring_is_capped_newest_first() {
        let clock = Arc::new(ManualClock::new(0));
        let (_, backups) = manager(clock.clone());

        for i in 0..15 {
            clock.advance_ms(FIVE_MINUTES_MS + 1);
            assert!(backups.create_backup(&snapshot(i), &format!("backup-{i}")));
        }

        let list = backups.list_backups();
        assert_eq!(list.len(), 10);
        assert_eq!(list[0].reason, "backup-14");
        assert_eq!(list[9].reason, "backup-5");
        assert!(list.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
    }

    #[test]
    fn test_ring_persists_across_reopen() {
        let clock = Arc::new(ManualClock::new(10));
        let (store, backups) = manager(clock.clone());
        backups.create_backup(&snapshot(4), "auto-load");

        let reopened = BackupManager::open(store, "backups", 10, FIVE_MINUTES_MS, clock);
        assert_eq!(reopened.list_backups(), backups.list_backups());
    }

    #[test]
    fn test_backup_is_a_deep_copy() {
        let clock = Arc::new(ManualClock::new(10));
        let (_, backups) = manager(clock);
        let mut live = snapshot(1);
        backups.create_backup(&live, "copy");

        live.data.running_log.clear();
        assert_eq!(backups.get(0).unwrap().snapshot.density(), 1);
    }

    #[test]
    fn test_corrupt_ring_starts_empty() {
        let store = Arc::new(InMemoryKeyValueStore::new(1 << 20));
        store.set("backups", "not json").unwrap();
        let backups = BackupManager::open(store, "backups", 10, FIVE_MINUTES_MS, Arc::new(ManualClock::new(0)));
        assert!(backups.is_empty());
    }

    #[test]
    fn test_quota_pressure_drops_oldest_then_fails() {
        let clock = Arc::new(ManualClock::new(0));
        let one_record = serde_json::to_string(&vec![BackupRecord {
            timestamp: 0,
            reason: "x".into(),
            snapshot: snapshot(5),
        }])
        .unwrap()
        .len();

        // Room for one record plus the key, not two
        let store = Arc::new(InMemoryKeyValueStore::new(one_record + 20));
        let backups = BackupManager::open(store, "backups", 10, FIVE_MINUTES_MS, clock.clone());

        assert!(backups.create_backup(&snapshot(5), "x"));
        clock.advance_ms(FIVE_MINUTES_MS);
        assert!(backups.create_backup(&snapshot(5), "y"));
        assert_eq!(backups.len(), 1);
        assert_eq!(backups.list_backups()[0].reason, "y");

        clock.advance_ms(FIVE_MINUTES_MS);
        assert!(!backups.create_backup(&snapshot(500), "too-big"));
        assert_eq!(backups.list_backups()[0].reason, "y");
    }

    #[test]
    fn test_newest_non_empty_skips_empty_snapshots() {
        let clock = Arc::new(ManualClock::new(0));
        let (_, backups) = manager(clock.clone());
        backups.create_backup(&snapshot(2), "has-data");
        clock.advance_ms(FIVE_MINUTES_MS);
        backups.create_backup(&snapshot(0), "empty");

        let (index, record) = backups.newest_non_empty().unwrap();
        assert_eq!(index, 1);
        assert_eq!(record.reason, "has-data");
    }
}
