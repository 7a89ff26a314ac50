// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tier adapters.
//!
//! Each adapter wraps one storage medium behind the same small contract:
//! `load` (None on any failure), `save` (bool), `is_available`. Failures
//! are logged and counted here and never propagate further.
//!
//! | Tier | Adapter | Medium | Calls |
//! |------|---------|--------|-------|
//! | 1 | [`CacheTier`] | [`KeyValueStore`] | synchronous |
//! | 2 | [`LocalTier`] | [`DocumentStore`] | async |
//! | 3 | [`RemoteTier`] | [`RemoteDocumentService`] | async, optional |
//!
//! # Write ordering
//!
//! Async tier writes are spawned and may complete in any order. Each write
//! takes a ticket when it is issued; the adapter drops any write whose
//! ticket is older than the last one it persisted, so a slow early write
//! can never overwrite a later one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig};
use crate::snapshot::Snapshot;
use crate::storage::traits::{DocumentStore, KeyValueStore, RemoteDocumentService, StorageError};

/// Which tier an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    Cache,
    Local,
    Remote,
}

impl TierKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn record_load(tier: TierKind, result: &Result<Option<Snapshot>, StorageError>) {
    let status = match result {
        Ok(Some(_)) => "hit",
        Ok(None) => "miss",
        Err(StorageError::Serialization(_)) => "corrupt",
        Err(_) => "error",
    };
    crate::metrics::record_tier_load(tier.as_str(), status);
}

fn decode(raw: Option<String>) -> Result<Option<Snapshot>, StorageError> {
    raw.map(|json| Snapshot::from_json(&json)).transpose()
}

/// Orders writes by ticket: only a ticket newer than the last persisted one may write.
#[derive(Default)]
struct WriteOrder {
    tickets: AtomicU64,
    last_written: Mutex<u64>,
}

impl WriteOrder {
    fn ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::AcqRel) + 1
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tier-1
// ═══════════════════════════════════════════════════════════════════════════

/// Tier-1: fast synchronous key-value cache holding the live snapshot.
pub struct CacheTier {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl CacheTier {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    /// Load, distinguishing "empty" from "failed".
    pub fn probe(&self) -> Result<Option<Snapshot>, StorageError> {
        if !self.store.is_available() {
            return Err(StorageError::Unavailable("cache store".to_string()));
        }
        let result = self.store.get(&self.key).and_then(decode);
        record_load(TierKind::Cache, &result);
        result
    }

    #[must_use]
    pub fn load(&self) -> Option<Snapshot> {
        self.probe()
            .map_err(|e| warn!(tier = "cache", error = %e, "Cache load failed"))
            .ok()
            .flatten()
    }

    /// Synchronous save. Quota overflow is reported as `false`, never raised.
    ///
    /// On failure the previous copy is removed: a stale Tier-1 snapshot
    /// would otherwise win the next cold start over a newer Tier-2 copy.
    pub fn save(&self, snapshot: &Snapshot) -> bool {
        let start = Instant::now();
        let result = snapshot
            .to_json()
            .and_then(|json| self.store.set(&self.key, &json));
        crate::metrics::record_write_latency("cache", start.elapsed());

        match result {
            Ok(()) => {
                crate::metrics::record_tier_write("cache", "success");
                true
            }
            Err(e) => {
                warn!(tier = "cache", error = %e, "Cache write failed, dropping stale copy");
                crate::metrics::record_tier_write("cache", "error");
                if let Err(e) = self.store.remove(&self.key) {
                    warn!(tier = "cache", error = %e, "Stale cache copy could not be removed");
                }
                false
            }
        }
    }

    /// Remove the live snapshot key.
    pub fn clear(&self) -> bool {
        match self.store.remove(&self.key) {
            Ok(()) => true,
            Err(e) => {
                warn!(tier = "cache", error = %e, "Cache clear failed");
                false
            }
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tier-2
// ═══════════════════════════════════════════════════════════════════════════

/// Tier-2: local transactional document store.
pub struct LocalTier {
    store: Arc<dyn DocumentStore>,
    document_id: String,
    order: WriteOrder,
}

impl LocalTier {
    pub fn new(store: Arc<dyn DocumentStore>, document_id: impl Into<String>) -> Self {
        Self {
            store,
            document_id: document_id.into(),
            order: WriteOrder::default(),
        }
    }

    pub async fn probe(&self) -> Result<Option<Snapshot>, StorageError> {
        let result = self.store.load(&self.document_id).await.and_then(decode);
        record_load(TierKind::Local, &result);
        result
    }

    pub async fn load(&self) -> Option<Snapshot> {
        self.probe()
            .await
            .map_err(|e| warn!(tier = "local", error = %e, "Local store load failed"))
            .ok()
            .flatten()
    }

    /// Reserve a write slot. Call at the moment the write is issued.
    #[must_use]
    pub fn ticket(&self) -> u64 {
        self.order.ticket()
    }

    pub async fn save(&self, snapshot: &Snapshot) -> bool {
        let ticket = self.ticket();
        self.save_ordered(snapshot, ticket).await
    }

    /// Save unless a write with a newer ticket has already landed.
    pub async fn save_ordered(&self, snapshot: &Snapshot, ticket: u64) -> bool {
        let mut last = self.order.last_written.lock().await;
        if ticket < *last {
            debug!(tier = "local", ticket, last = *last, "Skipping superseded write");
            crate::metrics::record_tier_write("local", "stale");
            return true;
        }

        let start = Instant::now();
        let result = match snapshot.to_json() {
            Ok(json) => self.store.save(&self.document_id, &json).await,
            Err(e) => Err(e),
        };
        crate::metrics::record_write_latency("local", start.elapsed());

        match result {
            Ok(()) => {
                *last = ticket;
                crate::metrics::record_tier_write("local", "success");
                true
            }
            Err(e) => {
                warn!(tier = "local", error = %e, "Local store write failed");
                crate::metrics::record_tier_write("local", "error");
                false
            }
        }
    }

    pub async fn is_available(&self) -> bool {
        self.store.is_available().await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tier-3
// ═══════════════════════════════════════════════════════════════════════════

/// Tier-3: optional remote document store.
///
/// With no service, or a service reporting `configured() == false`, every
/// operation is a no-op and the engine runs local-only.
pub struct RemoteTier {
    service: Option<Arc<dyn RemoteDocumentService>>,
    document_id: String,
    circuit: CircuitBreaker,
    order: WriteOrder,
}

impl RemoteTier {
    pub fn new(service: Option<Arc<dyn RemoteDocumentService>>, document_id: impl Into<String>) -> Self {
        Self::with_circuit(service, document_id, CircuitConfig::default())
    }

    pub fn with_circuit(
        service: Option<Arc<dyn RemoteDocumentService>>,
        document_id: impl Into<String>,
        circuit: CircuitConfig,
    ) -> Self {
        Self {
            service,
            document_id: document_id.into(),
            circuit: CircuitBreaker::new("remote", circuit),
            order: WriteOrder::default(),
        }
    }

    /// A remote tier with nothing behind it.
    #[must_use]
    pub fn unconfigured(document_id: impl Into<String>) -> Self {
        Self::new(None, document_id)
    }

    #[must_use]
    pub fn configured(&self) -> bool {
        self.service.as_ref().is_some_and(|s| s.configured())
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.configured()
    }

    fn service(&self) -> Result<&Arc<dyn RemoteDocumentService>, StorageError> {
        match &self.service {
            Some(service) if service.configured() => Ok(service),
            _ => Err(StorageError::RemoteUnconfigured),
        }
    }

    pub async fn probe(&self) -> Result<Option<Snapshot>, StorageError> {
        let service = self.service()?;
        let result = self
            .circuit
            .call(|| service.load_document(&self.document_id))
            .await
            .map_err(StorageError::from)
            .and_then(decode);
        record_load(TierKind::Remote, &result);
        result
    }

    pub async fn load(&self) -> Option<Snapshot> {
        match self.probe().await {
            Ok(snapshot) => snapshot,
            Err(StorageError::RemoteUnconfigured) => None,
            Err(e) => {
                warn!(tier = "remote", error = %e, "Remote load failed");
                None
            }
        }
    }

    #[must_use]
    pub fn ticket(&self) -> u64 {
        self.order.ticket()
    }

    pub async fn save(&self, snapshot: &Snapshot) -> bool {
        let ticket = self.ticket();
        self.save_ordered(snapshot, ticket).await
    }

    pub async fn save_ordered(&self, snapshot: &Snapshot, ticket: u64) -> bool {
        let service = match self.service() {
            Ok(service) => service,
            Err(_) => {
                crate::metrics::record_tier_write("remote", "skipped");
                return false;
            }
        };

        let mut last = self.order.last_written.lock().await;
        if ticket < *last {
            debug!(tier = "remote", ticket, last = *last, "Skipping superseded write");
            crate::metrics::record_tier_write("remote", "stale");
            return true;
        }

        let start = Instant::now();
        let result = match snapshot.to_json() {
            Ok(json) => self
                .circuit
                .call(|| service.save_document(&self.document_id, &json))
                .await
                .map_err(StorageError::from),
            Err(e) => Err(e),
        };
        crate::metrics::record_write_latency("remote", start.elapsed());

        match result {
            Ok(()) => {
                *last = ticket;
                crate::metrics::record_tier_write("remote", "success");
                true
            }
            Err(e) => {
                warn!(tier = "remote", error = %e, "Remote write failed, will retry on next sync");
                crate::metrics::record_tier_write("remote", "error");
                false
            }
        }
    }

    /// Subscribe to pushes of this document. None when unconfigured or unreachable.
    pub async fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        let service = self.service().ok()?;
        match service.subscribe(&self.document_id).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!(tier = "remote", error = %e, "Remote subscribe failed");
                None
            }
        }
    }
}
