// Copyright (C) 2024 Huawei Device Co., Ltd.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Durable second tier.
//!
//! This module defines the record layout kept in durable storage, the store
//! boundary and the two-level cache that layers an [`AssetCache`] over a
//! store. Two engines are provided: a process-local map and SQLite.
//!
//! [`AssetCache`]: crate::AssetCache

mod memory;
mod sqlite;
mod tiered;

use async_trait::async_trait;
use asset_core::{AssetError, AssetKind};
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use tiered::{TieredCache, TieredConfig, TieredStats};

/// One durable entry, keyed by asset id.
///
/// `body` holds the encoded asset, or `None` when the payload was too large
/// to persist and only its metadata was kept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurableRecord {
    pub key: String,
    pub kind: AssetKind,
    pub body: Option<Vec<u8>>,
    pub size_bytes: u64,
    /// Milliseconds since the Unix epoch at which the record was written.
    pub stored_at: u64,
    /// Milliseconds since the Unix epoch of the last read or write.
    pub accessed_at: u64,
    pub ttl_ms: Option<u64>,
    /// Cache format version the record was written with.
    pub version: String,
}

impl DurableRecord {
    /// Absolute expiry in milliseconds since the Unix epoch.
    pub fn expires_at(&self) -> Option<u64> {
        self.ttl_ms.map(|ttl| self.stored_at.saturating_add(ttl))
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at().is_some_and(|at| now_ms >= at)
    }

    pub fn is_metadata_only(&self) -> bool {
        self.body.is_none()
    }

    /// Bytes the record occupies in the store, not counting metadata.
    pub fn stored_bytes(&self) -> u64 {
        self.body.as_ref().map_or(0, |body| body.len() as u64)
    }
}

/// Transactional key-value store holding [`DurableRecord`]s.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Writes `record` under `key`, replacing any previous record.
    async fn put(&self, key: &str, record: &DurableRecord) -> Result<(), AssetError>;

    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, AssetError>;

    /// # Returns
    /// `true` if a record was removed.
    async fn delete(&self, key: &str) -> Result<bool, AssetError>;

    async fn clear(&self) -> Result<(), AssetError>;

    /// Walks every record, oldest `accessed_at` first, until `visitor`
    /// returns `false`.
    async fn scan(
        &self,
        visitor: &mut (dyn for<'r> FnMut(&'r DurableRecord) -> bool + Send),
    ) -> Result<(), AssetError>;
}
