// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory storage media.
//!
//! Used when a tier has no configured backend, and as the shared "remote"
//! between two engines in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::traits::{DocumentStore, KeyValueStore, RemoteDocumentService, StorageError};

/// Buffered push notifications per subscribed document
const PUSH_CHANNEL_CAPACITY: usize = 64;

/// Quota-limited in-memory key-value store (Tier-1 medium).
///
/// Writers serialize on the byte counter, so the quota check and the
/// insert it guards are one step.
pub struct InMemoryKeyValueStore {
    data: DashMap<String, String>,
    used_bytes: Mutex<usize>,
    max_bytes: usize,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            data: DashMap::new(),
            used_bytes: Mutex::new(0),
            max_bytes,
        }
    }

    /// Bytes currently held (keys + values)
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        *self.used_bytes.lock()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        let mut used = self.used_bytes.lock();
        self.data.clear();
        *used = 0;
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut used = self.used_bytes.lock();
        let entry_bytes = key.len() + value.len();
        let replaced = self.data.get(key).map_or(0, |v| key.len() + v.len());
        let needed = used.saturating_sub(replaced) + entry_bytes;
        if needed > self.max_bytes {
            return Err(StorageError::QuotaExceeded { needed, limit: self.max_bytes });
        }

        self.data.insert(key.to_string(), value.to_string());
        *used = needed;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut used = self.used_bytes.lock();
        if let Some((k, v)) = self.data.remove(key) {
            *used = used.saturating_sub(k.len() + v.len());
        }
        Ok(())
    }
}

/// In-memory document store (Tier-2 medium).
#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: DashMap<String, String>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load(&self, id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.docs.get(id).map(|d| d.value().clone()))
    }

    async fn save(&self, id: &str, document: &str) -> Result<(), StorageError> {
        self.docs.insert(id.to_string(), document.to_string());
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// In-memory remote document service (Tier-3 medium).
///
/// Every save is broadcast to subscribers of that document, including the
/// writer's own subscription, the same way a hosted document store echoes
/// writes back to all listeners.
pub struct InMemoryRemote {
    configured: bool,
    docs: DashMap<String, String>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            configured: true,
            docs: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    /// A remote with no endpoint set up; every operation is refused.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self { configured: false, ..Self::new() }
    }

    /// Raw stored document (for assertions).
    #[must_use]
    pub fn document(&self, id: &str) -> Option<String> {
        self.docs.get(id).map(|d| d.value().clone())
    }

    fn sender(&self, id: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(PUSH_CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteDocumentService for InMemoryRemote {
    fn configured(&self) -> bool {
        self.configured
    }

    async fn load_document(&self, id: &str) -> Result<Option<String>, StorageError> {
        if !self.configured {
            return Err(StorageError::RemoteUnconfigured);
        }
        Ok(self.document(id))
    }

    async fn save_document(&self, id: &str, document: &str) -> Result<(), StorageError> {
        if !self.configured {
            return Err(StorageError::RemoteUnconfigured);
        }
        self.docs.insert(id.to_string(), document.to_string());
        // No subscribers is fine
        let _ = self.sender(id).send(document.to_string());
        Ok(())
    }

    async fn subscribe(&self, id: &str) -> Result<broadcast::Receiver<String>, StorageError> {
        if !self.configured {
            return Err(StorageError::RemoteUnconfigured);
        }
        Ok(self.sender(id).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_put_get_remove() {
        let store = InMemoryKeyValueStore::new(1024);
        assert!(store.is_empty());

        store.set("k", "value").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("value"));
        assert_eq!(store.used_bytes(), 6);

        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
        assert_eq!(store.used_bytes(), 0);
    }

    #[test]
    fn test_kv_quota_exceeded() {
        let store = InMemoryKeyValueStore::new(10);
        let err = store.set("key", "way too long").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { limit: 10, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_kv_overwrite_accounts_for_replaced_value() {
        let store = InMemoryKeyValueStore::new(10);
        store.set("k", "12345678").unwrap(); // 9 bytes
        // Replacing frees the old value first, so this still fits
        store.set("k", "87654321").unwrap();
        assert_eq!(store.used_bytes(), 9);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_kv_concurrent_sets_respect_quota() {
        let store = std::sync::Arc::new(InMemoryKeyValueStore::new(100));
        let writers: Vec<_> = (0..8)
            .map(|t| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        // 10 bytes per entry
                        let _ = store.set(&format!("k{t}{}", i % 4), "0123456");
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let stored: usize = store.data.iter().map(|e| e.key().len() + e.value().len()).sum();
        assert_eq!(store.used_bytes(), stored);
        assert!(stored <= 100);
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn test_kv_remove_missing_is_ok() {
        let store = InMemoryKeyValueStore::new(10);
        assert!(store.remove("nothing").is_ok());
    }

    #[tokio::test]
    async fn test_document_store_overwrites() {
        let store = InMemoryDocumentStore::new();
        store.save("doc", "{\"v\":1}").await.unwrap();
        store.save("doc", "{\"v\":2}").await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("doc").await.unwrap().as_deref(), Some("{\"v\":2}"));
        assert!(store.load("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_broadcasts_saves() {
        let remote = InMemoryRemote::new();
        let mut rx = remote.subscribe("doc").await.unwrap();

        remote.save_document("doc", "payload").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "payload");
        assert_eq!(remote.document("doc").as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn test_unconfigured_remote_refuses_everything() {
        let remote = InMemoryRemote::unconfigured();
        assert!(!remote.configured());
        assert_eq!(
            remote.load_document("doc").await.unwrap_err(),
            StorageError::RemoteUnconfigured
        );
        assert_eq!(
            remote.save_document("doc", "x").await.unwrap_err(),
            StorageError::RemoteUnconfigured
        );
        assert!(remote.subscribe("doc").await.is_err());
    }
}
