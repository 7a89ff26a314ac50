// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage media underneath the three tiers.
//!
//! - Tier-1 ([`KeyValueStore`](traits::KeyValueStore)): [`file`] or [`memory`]
//! - Tier-2 ([`DocumentStore`](traits::DocumentStore)): [`sql`] or [`memory`]
//! - Tier-3 ([`RemoteDocumentService`](traits::RemoteDocumentService)): [`redis`] or [`memory`]

pub mod traits;
pub mod memory;
pub mod file;
pub mod sql;
pub mod redis;
