// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis document service for Tier-3.
//!
//! Each document is a plain string key holding the snapshot JSON. Saves
//! write the key and publish the same payload on a per-document channel
//! in one MULTI/EXEC, so every subscribed device sees every write:
//!
//! ```text
//! SET     {prefix}doc:{id}   <snapshot json>
//! PUBLISH {prefix}push:{id}  <snapshot json>
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{pipe, AsyncCommands, Client};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::traits::{RemoteDocumentService, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

const PUSH_CHANNEL_CAPACITY: usize = 64;

pub struct RedisRemote {
    client: Client,
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "streak:" → "streak:doc:progress")
    prefix: String,
    /// Live push fan-outs, one per subscribed document
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
}

impl RedisRemote {
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        // Use startup config: fast-fail, don't hang forever
        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::RemoteUnreachable(e.to_string()))?;

        info!(prefix = ?prefix, "Remote document service connected");
        Ok(Self {
            client,
            connection,
            prefix: prefix.unwrap_or("").to_string(),
            channels: Arc::new(DashMap::new()),
        })
    }

    #[inline]
    fn document_key(&self, id: &str) -> String {
        format!("{}doc:{}", self.prefix, id)
    }

    #[inline]
    fn push_channel(&self, id: &str) -> String {
        format!("{}push:{}", self.prefix, id)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl RemoteDocumentService for RedisRemote {
    fn configured(&self) -> bool {
        true
    }

    async fn load_document(&self, id: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection.clone();
        let document: Option<String> = conn
            .get(self.document_key(id))
            .await
            .map_err(|e| StorageError::RemoteUnreachable(e.to_string()))?;
        Ok(document)
    }

    async fn save_document(&self, id: &str, document: &str) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let mut pipeline = pipe();
        pipeline
            .atomic()
            .set(self.document_key(id), document)
            .ignore()
            .publish(self.push_channel(id), document)
            .ignore();

        let _: () = pipeline
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::RemoteUnreachable(e.to_string()))?;

        debug!(id = %id, bytes = document.len(), "Document saved to remote");
        Ok(())
    }

    async fn subscribe(&self, id: &str) -> Result<broadcast::Receiver<String>, StorageError> {
        if let Some(sender) = self.channels.get(id) {
            return Ok(sender.subscribe());
        }

        let channel = self.push_channel(id);
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StorageError::RemoteUnreachable(e.to_string()))?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| StorageError::RemoteUnreachable(e.to_string()))?;

        let (tx, rx) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        self.channels.insert(id.to_string(), tx.clone());

        let channels = Arc::clone(&self.channels);
        let doc_id = id.to_string();
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        // No receivers left is fine; they may resubscribe
                        let _ = tx.send(payload);
                    }
                    Err(e) => warn!(channel = %channel, error = %e, "Unreadable push payload"),
                }
            }
            // Stream closed (connection dropped): the next subscribe reconnects
            channels.remove(&doc_id);
            warn!(channel = %channel, "Remote push stream ended");
        });

        info!(id = %id, "Subscribed to remote pushes");
        Ok(rx)
    }
}
