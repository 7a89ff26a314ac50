// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local-vs-remote conflict resolution.
//!
//! Picks one whole snapshot, never merges. The policy is biased toward
//! density: losing logged data is worse than showing a slightly stale
//! copy, and entry counts are a steadier signal than clocks on different
//! devices. Rules, first match wins:
//!
//! 1. local is effectively empty and remote is not → remote
//! 2. remote holds more entries (by more than `remote_lead`) → remote
//! 3. remote is newer, unless local is richer by more than `local_margin` → remote
//! 4. otherwise → local
//!
//! # Example
//!
//! ```
//! use streak_sync::{ConflictPolicy, Resolution, SideSummary};
//!
//! let policy = ConflictPolicy::live();
//! let local = SideSummary { density: 30, last_modified: 1_000 };
//! let remote = SideSummary { density: 10, last_modified: 9_000 };
//! assert_eq!(policy.resolve(local, remote), Resolution::TakeLocal);
//! ```

use crate::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    TakeLocal,
    TakeRemote,
}

impl Resolution {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TakeLocal => "take_local",
            Self::TakeRemote => "take_remote",
        }
    }
}

/// The two numbers the resolver looks at for one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideSummary {
    pub density: usize,
    pub last_modified: i64,
}

impl SideSummary {
    #[must_use]
    pub fn of(snapshot: &Snapshot) -> Self {
        Self {
            density: snapshot.density(),
            last_modified: snapshot.last_modified,
        }
    }

    /// No local snapshot at all.
    #[must_use]
    pub fn absent() -> Self {
        Self { density: 0, last_modified: 0 }
    }
}

/// Thresholds for one resolution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPolicy {
    /// Local below this is "effectively empty"; remote must exceed it to count as non-trivial
    pub empty_threshold: usize,
    /// Remote must exceed local density by more than this to win on density
    pub remote_lead: usize,
    /// A newer remote loses if local is richer by more than this
    pub local_margin: usize,
}

impl ConflictPolicy {
    /// Live push from another device.
    #[must_use]
    pub const fn live() -> Self {
        Self { empty_threshold: 3, remote_lead: 0, local_margin: 5 }
    }

    /// Cold reconcile against the remote at startup. Coarser: the remote
    /// copy may be days old, so it needs a clearer lead to win on density
    /// and local keeps a wider margin against its newer clock.
    #[must_use]
    pub const fn startup() -> Self {
        Self { empty_threshold: 3, remote_lead: 2, local_margin: 10 }
    }

    #[must_use]
    pub fn resolve(&self, local: SideSummary, remote: SideSummary) -> Resolution {
        if local.density < self.empty_threshold && remote.density > self.empty_threshold {
            return Resolution::TakeRemote;
        }

        if remote.density > local.density + self.remote_lead {
            return Resolution::TakeRemote;
        }

        let local_much_richer = local.density > remote.density + self.local_margin;
        if remote.last_modified > local.last_modified && !local_much_richer {
            return Resolution::TakeRemote;
        }

        Resolution::TakeLocal
    }

    /// Resolve two snapshots directly.
    #[must_use]
    pub fn resolve_snapshots(&self, local: &Snapshot, remote: &Snapshot) -> Resolution {
        self.resolve(SideSummary::of(local), SideSummary::of(remote))
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(density: usize, last_modified: i64) -> SideSummary {
        SideSummary { density, last_modified }
    }

    #[test]
    fn test_empty_local_defers_to_remote() {
        let policy = ConflictPolicy::live();
        assert_eq!(policy.resolve(side(0, 9_999), side(20, 1)), Resolution::TakeRemote);
        assert_eq!(policy.resolve(side(2, 50), side(4, 10)), Resolution::TakeRemote);
    }

    #[test]
    fn test_richer_local_beats_newer_remote() {
        let policy = ConflictPolicy::live();
        assert_eq!(policy.resolve(side(30, 100), side(10, 200)), Resolution::TakeLocal);
    }

    #[test]
    fn test_genuine_staleness_takes_remote() {
        let policy = ConflictPolicy::live();
        assert_eq!(policy.resolve(side(10, 100), side(12, 200)), Resolution::TakeRemote);
    }

    #[test]
    fn test_denser_remote_wins_even_if_older() {
        let policy = ConflictPolicy::live();
        assert_eq!(policy.resolve(side(10, 500), side(11, 100)), Resolution::TakeRemote);
    }

    #[test]
    fn test_margin_boundary() {
        let policy = ConflictPolicy::live();
        // local exactly 5 richer: not "substantially" richer, newer remote wins
        assert_eq!(policy.resolve(side(15, 100), side(10, 200)), Resolution::TakeRemote);
        // 6 richer: local holds
        assert_eq!(policy.resolve(side(16, 100), side(10, 200)), Resolution::TakeLocal);
    }

    #[test]
    fn test_equal_sides_keep_local() {
        let policy = ConflictPolicy::live();
        assert_eq!(policy.resolve(side(7, 100), side(7, 100)), Resolution::TakeLocal);
        assert_eq!(policy.resolve(side(0, 0), side(0, 0)), Resolution::TakeLocal);
    }

    #[test]
    fn test_trivial_remote_does_not_trigger_empty_rule() {
        let policy = ConflictPolicy::live();
        // remote density 3 is not "> 3"; falls through to rule 2 (3 > 1)
        assert_eq!(policy.resolve(side(1, 100), side(3, 50)), Resolution::TakeRemote);
        // both tiny, remote older and not denser
        assert_eq!(policy.resolve(side(2, 100), side(2, 50)), Resolution::TakeLocal);
    }

    #[test]
    fn test_startup_policy_is_coarser() {
        let live = ConflictPolicy::live();
        let startup = ConflictPolicy::startup();

        // One extra entry on an older remote wins live but not at startup
        assert_eq!(live.resolve(side(10, 500), side(11, 100)), Resolution::TakeRemote);
        assert_eq!(startup.resolve(side(10, 500), side(11, 100)), Resolution::TakeLocal);

        // Local 8 richer holds live, but a newer remote still wins at startup
        assert_eq!(live.resolve(side(18, 100), side(10, 200)), Resolution::TakeLocal);
        assert_eq!(startup.resolve(side(18, 100), side(10, 200)), Resolution::TakeRemote);
    }

    #[test]
    fn test_resolve_snapshots_uses_density_and_clock() {
        let mut local = Snapshot::new(100);
        let mut remote = Snapshot::new(200);
        for _ in 0..30 {
            local.data.reading.push(Default::default());
        }
        for _ in 0..10 {
            remote.data.reading.push(Default::default());
        }
        assert_eq!(ConflictPolicy::live().resolve_snapshots(&local, &remote), Resolution::TakeLocal);
    }
}
