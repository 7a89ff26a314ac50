//! Property-based tests (fuzzing) for the persistence engine.
//!
//! Uses proptest to generate random/malformed inputs and verify that
//! decoding never panics, conflict resolution keeps its guarantees, the
//! backup ring stays bounded and ordered tier writes always converge on
//! the newest issued write.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;

use streak_sync::snapshot::{RunEntry, LiftEntry};
use streak_sync::storage::memory::{InMemoryDocumentStore, InMemoryKeyValueStore};
use streak_sync::{
    BackupManager, ConflictPolicy, DayRecord, DocumentStore, LocalTier, ManualClock, Resolution,
    SideSummary, Snapshot,
};

const FIVE_MINUTES_MS: i64 = 5 * 60 * 1000;

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn run_entry_strategy() -> impl Strategy<Value = RunEntry> {
    (1u32..=28, 1u16..50, 60u32..20_000).prop_map(|(day, km, secs)| RunEntry {
        date: format!("2026-10-{day:02}"),
        // Whole kilometres so the JSON float round trip is exact
        distance_km: f64::from(km),
        duration_secs: secs,
        notes: None,
    })
}

fn day_record_strategy() -> impl Strategy<Value = DayRecord> {
    (
        prop::collection::btree_map("[a-z]{3,10}", any::<bool>(), 0..6),
        prop::option::of(0u32..5000),
        any::<bool>(),
        prop::option::of("[a-zA-Z ]{0,40}"),
    )
        .prop_map(|(habits, water_ml, workout_done, notes)| DayRecord {
            habits,
            water_ml,
            workout_done,
            notes,
            ..Default::default()
        })
}

/// Generate a valid snapshot with random content
fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    (
        0i64..4_000_000_000_000,
        prop::collection::vec(run_entry_strategy(), 0..20),
        prop::collection::btree_map("2026-(0[1-9]|1[0-2])-(0[1-9]|1[0-9]|2[0-8])", day_record_strategy(), 0..10),
        "[a-zA-Z]{0,12}",
    )
        .prop_map(|(last_modified, running_log, days, name)| {
            let mut snapshot = Snapshot::new(last_modified);
            snapshot.data.running_log = running_log;
            snapshot.data.days = days;
            snapshot.data.profile.name = name;
            snapshot
        })
}

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,  // depth
        64, // max nodes
        10, // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map("[a-zA-Z]{1,12}", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn side_strategy() -> impl Strategy<Value = SideSummary> {
    (0usize..200, 0i64..1_000_000).prop_map(|(density, last_modified)| SideSummary {
        density,
        last_modified,
    })
}

// =============================================================================
// Decoding Fuzz Tests
// =============================================================================

proptest! {
    /// Snapshot decoding should never panic on arbitrary strings
    #[test]
    fn fuzz_snapshot_from_random_string(raw in ".{0,2000}") {
        let _ = Snapshot::from_json(&raw);
    }

    /// Whatever decodes must carry a schema marker
    #[test]
    fn fuzz_snapshot_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let serialized = serde_json::to_string(&json).unwrap();
        if let Ok(snapshot) = Snapshot::from_json(&serialized) {
            prop_assert!(snapshot.has_schema_marker());
        }
    }

    /// Truncating a valid document anywhere never panics
    #[test]
    fn fuzz_truncated_snapshot(snapshot in snapshot_strategy(), cut in 0usize..4096) {
        let json = snapshot.to_json().unwrap();
        let mut cut = cut.min(json.len());
        while !json.is_char_boundary(cut) {
            cut -= 1;
        }
        let result = Snapshot::from_json(&json[..cut]);
        if cut < json.len() {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn prop_snapshot_roundtrip(snapshot in snapshot_strategy()) {
        let json = snapshot.to_json().unwrap();
        let decoded = Snapshot::from_json(&json).unwrap();
        prop_assert_eq!(decoded.density(), snapshot.density());
        prop_assert_eq!(decoded, snapshot);
    }
}

// =============================================================================
// Density
// =============================================================================

proptest! {
    /// Every appended history row counts exactly once
    #[test]
    fn prop_density_counts_history_rows(
        snapshot in snapshot_strategy(),
        runs in prop::collection::vec(run_entry_strategy(), 1..10),
        lifts in 0usize..10,
    ) {
        let before = snapshot.density();
        let mut grown = snapshot;
        grown.data.running_log.extend(runs.iter().cloned());
        for _ in 0..lifts {
            grown.data.lift_history.push(LiftEntry::default());
        }
        prop_assert_eq!(grown.density(), before + runs.len() + lifts);
    }

    /// Unchecked habits and empty notes are not user effort
    #[test]
    fn prop_density_ignores_unset_fields(habits in prop::collection::vec("[a-z]{3,8}", 0..8)) {
        let mut snapshot = Snapshot::new(1);
        let day = snapshot.data.day_mut("2026-10-18");
        day.habits = habits.into_iter().map(|h| (h, false)).collect::<BTreeMap<_, _>>();
        day.notes = Some("   ".into());
        prop_assert_eq!(snapshot.density(), 0);
    }
}

// =============================================================================
// Conflict Resolution Properties
// =============================================================================

proptest! {
    /// An effectively empty local never blocks a non-trivial remote
    #[test]
    fn prop_empty_local_defers(
        local_density in 0usize..3,
        remote_density in 4usize..500,
        local_modified in 0i64..1_000_000,
        remote_modified in 0i64..1_000_000,
    ) {
        let local = SideSummary { density: local_density, last_modified: local_modified };
        let remote = SideSummary { density: remote_density, last_modified: remote_modified };
        prop_assert_eq!(ConflictPolicy::live().resolve(local, remote), Resolution::TakeRemote);
        prop_assert_eq!(ConflictPolicy::startup().resolve(local, remote), Resolution::TakeRemote);
    }

    /// Live pushes: strictly denser remote always wins, whatever the clocks say
    #[test]
    fn prop_denser_remote_wins_live(local in side_strategy(), extra in 1usize..100, remote_modified in 0i64..1_000_000) {
        let remote = SideSummary { density: local.density + extra, last_modified: remote_modified };
        prop_assert_eq!(ConflictPolicy::live().resolve(local, remote), Resolution::TakeRemote);
    }

    /// Identical sides keep local under both policies
    #[test]
    fn prop_identical_sides_keep_local(side in side_strategy()) {
        prop_assert_eq!(ConflictPolicy::live().resolve(side, side), Resolution::TakeLocal);
        prop_assert_eq!(ConflictPolicy::startup().resolve(side, side), Resolution::TakeLocal);
    }

    /// A much richer local survives a newer but poorer remote
    #[test]
    fn prop_much_richer_local_survives_newer_remote(
        remote_density in 3usize..100,
        lead in 11usize..100,
        local_modified in 0i64..1_000_000,
        newer_by in 1i64..1_000_000,
    ) {
        let local = SideSummary { density: remote_density + lead, last_modified: local_modified };
        let remote = SideSummary { density: remote_density, last_modified: local_modified + newer_by };
        prop_assert_eq!(ConflictPolicy::live().resolve(local, remote), Resolution::TakeLocal);
        prop_assert_eq!(ConflictPolicy::startup().resolve(local, remote), Resolution::TakeLocal);
    }

    /// Resolution is a pure function of the two summaries
    #[test]
    fn prop_resolution_deterministic(local in side_strategy(), remote in side_strategy()) {
        let policy = ConflictPolicy::startup();
        prop_assert_eq!(policy.resolve(local, remote), policy.resolve(local, remote));
    }
}

// =============================================================================
// Backup Ring Invariants
// =============================================================================

proptest! {
    #[test]
    fn prop_backup_ring_bounded_and_spaced(
        steps in prop::collection::vec((0i64..20 * 60 * 1000, 0usize..5), 1..60),
    ) {
        let clock = Arc::new(ManualClock::new(1_760_000_000_000));
        let backups = BackupManager::open(
            Arc::new(InMemoryKeyValueStore::new(1 << 22)),
            "app_state_backups",
            10,
            FIVE_MINUTES_MS,
            clock.clone(),
        );

        for (advance, runs) in steps {
            clock.advance_ms(advance);
            let mut snapshot = Snapshot::new(1);
            for _ in 0..runs {
                snapshot.data.running_log.push(RunEntry::default());
            }
            prop_assert!(backups.create_backup(&snapshot, "prop"));
        }

        let ring = backups.list_backups();
        prop_assert!(!ring.is_empty());
        prop_assert!(ring.len() <= 10);
        for pair in ring.windows(2) {
            // Newest first, never two inside one dedup window
            prop_assert!(pair[0].timestamp - pair[1].timestamp >= FIVE_MINUTES_MS);
        }
    }
}

// =============================================================================
// Ordered Tier Writes
// =============================================================================

proptest! {
    /// However the background writes complete, the stored document is the
    /// one issued last
    #[test]
    fn prop_ordered_writes_converge_on_last_issued(
        order in Just((0..12).collect::<Vec<i64>>()).prop_shuffle(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let stored = runtime.block_on(async {
            let docs = Arc::new(InMemoryDocumentStore::new());
            let tier = LocalTier::new(docs.clone(), "progress");
            let tickets: Vec<u64> = (0..12).map(|_| tier.ticket()).collect();

            for issued in &order {
                let snapshot = Snapshot::new(*issued);
                prop_assert!(tier.save_ordered(&snapshot, tickets[*issued as usize]).await);
            }
            let raw = docs.load("progress").await.unwrap().unwrap();
            Ok(Snapshot::from_json(&raw).unwrap())
        })?;

        prop_assert_eq!(stored.last_modified, 11);
    }
}
