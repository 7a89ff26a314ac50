// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local-only streak-sync usage example.
//!
//! Demonstrates:
//! 1. Starting the engine on a file cache and a SQLite store (no remote)
//! 2. Creating the first-run snapshot
//! 3. Logging today's habits and a run
//! 4. Taking and listing backups
//! 5. Restarting and recovering the snapshot
//! 6. Displaying metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example local_only
//!
//! # Keep the data directory and see engine logs
//! STREAK_DATA=./data RUST_LOG=streak_sync=debug cargo run --example local_only
//! ```

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use streak_sync::snapshot::RunEntry;
use streak_sync::{PersistenceConfig, PersistenceEngine, RecoveryOutcome};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           streak-sync: Local-Only Example                     ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // Scratch directory unless STREAK_DATA points somewhere to keep
    let scratch = tempfile::tempdir()?;
    let data_dir = std::env::var("STREAK_DATA")
        .unwrap_or_else(|_| scratch.path().to_string_lossy().into_owned());

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start the engine
    // ─────────────────────────────────────────────────────────────────────────
    let config = PersistenceConfig {
        cache_dir: Some(format!("{data_dir}/cache")),
        sqlite_url: Some(format!("sqlite://{data_dir}/progress.db?mode=rwc")),
        remote_url: None,
        ..Default::default()
    };
    println!("📦 Data directory: {data_dir}");

    let (_config_tx, config_rx) = watch::channel(config.clone());
    let mut engine = PersistenceEngine::new(config.clone(), config_rx);

    println!("\n🚀 Starting engine...");
    let outcome = engine.start().await?;
    println!("   └─ Recovery: {outcome:?}");

    // ─────────────────────────────────────────────────────────────────────────
    // 2. First run
    // ─────────────────────────────────────────────────────────────────────────
    if outcome == RecoveryOutcome::NoPriorState {
        engine.init()?;
        println!("   ✅ Created first-run snapshot");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Log some progress
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Logging today ({})...", engine.today());
    engine.update_today(|day| {
        day.habits.insert("stretch".into(), true);
        day.habits.insert("read".into(), true);
        day.water_ml = Some(2000);
    })?;
    let report = engine.mutate(|snapshot| {
        snapshot.data.running_log.push(RunEntry {
            date: "2026-10-18".into(),
            distance_km: 5.0,
            duration_secs: 1650,
            notes: Some("easy pace".into()),
        });
    })?;
    println!(
        "   └─ Saved at {} (cache: {}, background writes: {})",
        report.last_modified, report.cache_saved, report.queued
    );

    let failed = engine.flush().await;
    println!("   ✅ Background writes done ({failed} failed)");

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Backups
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n💾 Backups:");
    engine.create_backup("manual");
    for (index, backup) in engine.list_backups().iter().enumerate() {
        println!(
            "   └─ [{index}] {} at {} (density {})",
            backup.reason,
            backup.timestamp,
            backup.snapshot.density()
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Restart and recover
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔁 Restarting...");
    engine.shutdown().await;
    let (_config_tx, config_rx) = watch::channel(config.clone());
    let mut engine = PersistenceEngine::new(config, config_rx);
    let outcome = engine.start().await?;
    println!("   └─ Recovery: {outcome:?}");
    println!("   └─ Status: {:?}", engine.status());

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    engine.shutdown().await;
    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump captured counters and gauges, sorted by name
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            match value {
                DebugValue::Counter(v) => Some(format!("{}{} = {}", key.name(), label_str, v)),
                DebugValue::Gauge(v) => Some(format!("{}{} = {:.0}", key.name(), label_str, v.into_inner())),
                DebugValue::Histogram(_) => None,
            }
        })
        .collect();
    lines.sort();

    for line in &lines {
        println!("   └─ {line}");
    }
}
