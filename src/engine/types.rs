// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the persistence engine.

use thiserror::Error;

use crate::sync::SyncState;

/// Engine lifecycle state.
///
/// Use [`super::PersistenceEngine::state()`] to check the current state or
/// [`super::PersistenceEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, not yet started
    Created,
    /// Probing tiers and backups for a usable snapshot
    Recovering,
    /// Recovery done, accepting mutations
    Ready,
    /// Run loop active (periodic sync and push subscription)
    Running,
    /// Graceful shutdown in progress
    ShuttingDown,
}

impl EngineState {
    /// Numeric code for the state gauge.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Recovering => 1,
            Self::Ready => 2,
            Self::Running => 3,
            Self::ShuttingDown => 4,
        }
    }

    /// Whether mutations are accepted in this state.
    #[must_use]
    pub fn accepts_writes(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Recovering => write!(f, "Recovering"),
            Self::Ready => write!(f, "Ready"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// Misuse of the engine API. Tier failures never surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine is not accepting writes (state: {0})")]
    NotReady(EngineState),

    #[error("engine already started (state: {0})")]
    AlreadyStarted(EngineState),

    #[error("no snapshot loaded")]
    NoSnapshot,

    #[error("no backup at index {index} ({len} available)")]
    BackupIndex { index: usize, len: usize },
}

/// Result of a write-through cascade.
///
/// Only Tier-1 is known synchronously; Tier-2/Tier-3 writes are queued
/// and reaped later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    /// Stamp written into the snapshot
    pub last_modified: i64,
    /// Tier-1 accepted the write
    pub cache_saved: bool,
    /// Async tier writes spawned for this save
    pub queued: usize,
}

impl SaveReport {
    /// A save counts as successful when at least Tier-1 took it.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.cache_saved
    }
}

/// What the engine did with an incoming remote push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Our own write (or an identical copy) coming back
    Echo,
    /// Remote replaced the local snapshot
    AdoptedRemote,
    /// Local kept and pushed back to the remote
    AssertedLocal,
    /// Payload could not be decoded
    Rejected,
}

impl PushOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::AdoptedRemote => "adopted_remote",
            Self::AssertedLocal => "asserted_local",
            Self::Rejected => "rejected",
        }
    }
}

/// Point-in-time view of the engine, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub state: EngineState,
    pub sync_state: SyncState,
    /// A snapshot is held in memory
    pub loaded: bool,
    pub last_modified: Option<i64>,
    pub density: usize,
    pub backups: usize,
    pub remote_configured: bool,
    /// Epoch millis of the last successful remote push or pull
    pub last_sync_ms: Option<i64>,
    /// Tier-2/Tier-3 writes not yet reaped
    pub pending_writes: usize,
}
