// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation.
//!
//! Uses the `metrics` crate facade; the host application picks the exporter.
//!
//! # Metric Naming Convention
//! - `streak_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `tier`: cache, local, remote
//! - `status`: success, error, skipped, stale

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Record a tier write outcome
pub fn record_tier_write(tier: &str, status: &str) {
    counter!(
        "streak_sync_tier_writes_total",
        "tier" => tier.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a tier load outcome (hit, miss, error, corrupt)
pub fn record_tier_load(tier: &str, status: &str) {
    counter!(
        "streak_sync_tier_loads_total",
        "tier" => tier.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_write_latency(tier: &str, duration: Duration) {
    histogram!(
        "streak_sync_tier_write_seconds",
        "tier" => tier.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a backup attempt (created, deduplicated, failed)
pub fn record_backup(status: &str) {
    counter!(
        "streak_sync_backups_total",
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn set_backup_count(count: usize) {
    gauge!("streak_sync_backup_count").set(count as f64);
}

/// Record a remote sync push (success, error, skipped)
pub fn record_sync_push(trigger: &str, status: &str) {
    counter!(
        "streak_sync_pushes_total",
        "trigger" => trigger.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record how an incoming remote snapshot was resolved
pub fn record_resolution(context: &str, outcome: &str) {
    counter!(
        "streak_sync_resolutions_total",
        "context" => context.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record where startup recovery found state
pub fn record_recovery(source: &str) {
    counter!(
        "streak_sync_recoveries_total",
        "source" => source.to_string()
    )
    .increment(1);
}

pub fn record_recovery_duration(duration: Duration) {
    histogram!("streak_sync_recovery_seconds").record(duration.as_secs_f64());
}

pub fn set_snapshot_density(density: usize) {
    gauge!("streak_sync_snapshot_density").set(density as f64);
}

pub fn set_pending_writes(count: usize) {
    gauge!("streak_sync_pending_writes").set(count as f64);
}

/// Engine state as a number (0 = Created .. 4 = ShuttingDown)
pub fn set_engine_state(state: u8) {
    gauge!("streak_sync_engine_state").set(f64::from(state));
}

pub fn record_circuit_call(circuit: &str, status: &str) {
    counter!(
        "streak_sync_circuit_calls_total",
        "circuit" => circuit.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
