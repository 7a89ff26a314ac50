// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote sync scheduling.
//!
//! A deliberately small state machine: `Idle → Syncing → Idle`. Only one
//! sync runs at a time; a tick or push that arrives while another sync is
//! in flight is skipped rather than queued; the next interval tick picks
//! up whatever it missed. The scheduler decides *whether* to sync, the
//! engine does the work.
//!
//! The scheduler also remembers the last few snapshots this process pushed,
//! so the remote echoing our own write back over the subscription is not
//! mistaken for another device's change.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::Mutex;

const RECENT_PUSHES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Syncing => write!(f, "Syncing"),
        }
    }
}

/// What caused a remote push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Periodic tick
    Interval,
    /// Local won against an incoming remote push
    AssertLocal,
    /// A backup was restored
    Restore,
    /// Local won the startup reconcile
    Startup,
    /// Caller asked explicitly
    Manual,
    /// Write-through of a local mutation
    Mutation,
    Shutdown,
}

impl SyncTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::AssertLocal => "assert_local",
            Self::Restore => "restore",
            Self::Startup => "startup",
            Self::Manual => "manual",
            Self::Mutation => "mutation",
            Self::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug)]
pub struct SyncScheduler {
    syncing: AtomicBool,
    /// Epoch millis of the last successful push or pull (0 = never)
    last_success_ms: AtomicI64,
    /// (last_modified, density) of recent pushes, newest last
    pushed: Mutex<VecDeque<(i64, usize)>>,
}

impl SyncScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            syncing: AtomicBool::new(false),
            last_success_ms: AtomicI64::new(0),
            pushed: Mutex::new(VecDeque::with_capacity(RECENT_PUSHES)),
        }
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        if self.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// Enter `Syncing`. None if a sync is already running.
    #[must_use]
    pub fn try_begin(&self) -> Option<SyncGuard<'_>> {
        if self.syncing.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(SyncGuard { flag: &self.syncing })
    }

    /// Whether a periodic tick should push: more than `min_gap_ms` since the last success.
    #[must_use]
    pub fn is_due(&self, now_ms: i64, min_gap_ms: i64) -> bool {
        now_ms - self.last_success_ms.load(Ordering::Acquire) > min_gap_ms
    }

    pub fn record_success(&self, now_ms: i64) {
        self.last_success_ms.store(now_ms, Ordering::Release);
    }

    #[must_use]
    pub fn last_success_ms(&self) -> Option<i64> {
        match self.last_success_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Remember a snapshot this process is about to push.
    pub fn note_pushed(&self, last_modified: i64, density: usize) {
        let mut pushed = self.pushed.lock();
        if pushed.contains(&(last_modified, density)) {
            return;
        }
        if pushed.len() == RECENT_PUSHES {
            pushed.pop_front();
        }
        pushed.push_back((last_modified, density));
    }

    /// Whether an incoming push is one of our own recent writes coming back.
    #[must_use]
    pub fn is_own_echo(&self, last_modified: i64, density: usize) -> bool {
        self.pushed.lock().contains(&(last_modified, density))
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the scheduler to `Idle` when dropped.
pub struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_reentrant() {
        let scheduler = SyncScheduler::new();
        assert_eq!(scheduler.state(), SyncState::Idle);

        let guard = scheduler.try_begin().unwrap();
        assert_eq!(scheduler.state(), SyncState::Syncing);
        assert!(scheduler.try_begin().is_none());

        drop(guard);
        assert_eq!(scheduler.state(), SyncState::Idle);
        assert!(scheduler.try_begin().is_some());
    }

    #[test]
    fn test_due_after_gap() {
        let scheduler = SyncScheduler::new();
        assert!(scheduler.is_due(30_000, 25_000));
        assert!(scheduler.last_success_ms().is_none());

        scheduler.record_success(30_000);
        assert!(!scheduler.is_due(40_000, 25_000));
        assert!(!scheduler.is_due(55_000, 25_000));
        assert!(scheduler.is_due(55_001, 25_000));
        assert_eq!(scheduler.last_success_ms(), Some(30_000));
    }

    #[test]
    fn test_own_echo_window() {
        let scheduler = SyncScheduler::new();
        assert!(!scheduler.is_own_echo(100, 3));

        scheduler.note_pushed(100, 3);
        assert!(scheduler.is_own_echo(100, 3));
        // Same clock, different content: another device
        assert!(!scheduler.is_own_echo(100, 4));

        for i in 0..RECENT_PUSHES as i64 {
            scheduler.note_pushed(200 + i, 1);
        }
        assert!(!scheduler.is_own_echo(100, 3));
        assert!(scheduler.is_own_echo(200, 1));
    }

    #[test]
    fn test_display() {
        assert_eq!(SyncState::Syncing.to_string(), "Syncing");
        assert_eq!(SyncTrigger::AssertLocal.as_str(), "assert_local");
    }
}
