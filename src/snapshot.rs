// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Application state snapshot.
//!
//! The [`Snapshot`] is the single document that flows through every tier.
//! It is only ever written or replaced whole. The engine looks inside it
//! for exactly two things: the schema marker (`version`) and the
//! [`density`](Snapshot::density) used by conflict resolution.
//!
//! # Example
//!
//! ```
//! use streak_sync::{Snapshot, CURRENT_SCHEMA_VERSION};
//!
//! let mut snapshot = Snapshot::new(1_700_000_000_000);
//! assert_eq!(snapshot.version, CURRENT_SCHEMA_VERSION);
//! assert_eq!(snapshot.density(), 0);
//!
//! snapshot.data.day_mut("2026-10-18").habits.insert("stretch".into(), true);
//! assert_eq!(snapshot.density(), 1);
//!
//! let json = snapshot.to_json().unwrap();
//! assert_eq!(Snapshot::from_json(&json).unwrap(), snapshot);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage::traits::StorageError;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// The whole application state at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Schema marker. Zero means "not one of ours".
    #[serde(default)]
    pub version: u32,
    /// Epoch millis of the last successful mutation
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub data: AppData,
}

/// Domain sub-records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppData {
    pub profile: Profile,
    pub goals: Vec<Goal>,
    /// Per-day records keyed by `YYYY-MM-DD`
    pub days: BTreeMap<String, DayRecord>,
    pub running_log: Vec<RunEntry>,
    pub lift_history: Vec<LiftEntry>,
    pub injuries: Vec<InjuryEntry>,
    pub reading: Vec<ReadingEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub name: String,
    pub body_weight_kg: Option<f64>,
    pub level: u32,
    pub xp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub target: Option<f64>,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DayRecord {
    /// Habit name → completed
    pub habits: BTreeMap<String, bool>,
    pub meals: Vec<MealEntry>,
    pub water_ml: Option<u32>,
    pub weight_kg: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub workout_done: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MealEntry {
    pub name: String,
    pub calories: Option<u32>,
    pub protein_g: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunEntry {
    pub date: String,
    pub distance_km: f64,
    pub duration_secs: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiftEntry {
    pub date: String,
    pub exercise: String,
    pub weight_kg: f64,
    pub reps: u32,
    pub sets: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InjuryEntry {
    pub date: String,
    pub area: String,
    pub severity: u8,
    pub notes: Option<String>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadingEntry {
    pub date: String,
    pub title: String,
    pub pages: u32,
}

impl Snapshot {
    /// Fresh first-run snapshot at the current schema version.
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            last_modified: now_ms,
            data: AppData::default(),
        }
    }

    /// Whether the schema marker identifies this as an app snapshot.
    #[must_use]
    pub fn has_schema_marker(&self) -> bool {
        self.version > 0
    }

    /// Count of meaningful populated entries (logged values, history rows).
    ///
    /// Used only as a "how much user effort would be lost" proxy when
    /// choosing between two copies. Never persisted.
    #[must_use]
    pub fn density(&self) -> usize {
        let data = &self.data;
        let days: usize = data.days.values().map(DayRecord::density).sum();

        days
            + data.goals.len()
            + data.running_log.len()
            + data.lift_history.len()
            + data.injuries.len()
            + data.reading.len()
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a snapshot, rejecting documents without a schema marker.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        let snapshot: Snapshot = serde_json::from_str(raw)?;
        if !snapshot.has_schema_marker() {
            return Err(StorageError::Serialization(
                "document has no schema version marker".to_string(),
            ));
        }
        Ok(snapshot)
    }
}

impl AppData {
    /// Get or create the record for `date`.
    pub fn day_mut(&mut self, date: &str) -> &mut DayRecord {
        self.days.entry(date.to_string()).or_default()
    }
}

impl DayRecord {
    #[must_use]
    pub fn density(&self) -> usize {
        let habits = self.habits.values().filter(|done| **done).count();
        let logged = [
            self.water_ml.is_some(),
            self.weight_kg.is_some(),
            self.sleep_hours.is_some(),
            self.workout_done,
            self.notes.as_deref().is_some_and(|n| !n.trim().is_empty()),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();

        habits + self.meals.len() + logged
    }
}
