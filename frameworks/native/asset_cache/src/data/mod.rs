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

//! Cache entries and the bookkeeping behind eviction.
//!
//! This module holds the per-entry record wrapped around a loaded asset, the
//! byte budget and the policy-specific choice of the next entry to evict.

mod policy;
mod space;

use std::sync::Arc;

use asset_core::LoadedAsset;
use tokio::time::Instant;

pub(crate) use policy::select_victim;
pub(crate) use space::ByteBudget;

/// A cached asset with its access bookkeeping.
pub(crate) struct CacheEntry {
    pub(crate) asset: Arc<LoadedAsset>,
    pub(crate) size_bytes: u64,
    /// Monotonic insertion counter, used by FIFO.
    pub(crate) seq: u64,
    pub(crate) created_at: Instant,
    pub(crate) last_access: Instant,
    pub(crate) access_count: u64,
    pub(crate) expires_at: Option<Instant>,
}

impl CacheEntry {
    pub(crate) fn new(asset: Arc<LoadedAsset>, seq: u64, now: Instant, expires_at: Option<Instant>) -> Self {
        Self {
            size_bytes: asset.size_bytes,
            asset,
            seq,
            created_at: now,
            last_access: now,
            access_count: 0,
            expires_at,
        }
    }

    /// An entry is expired from its expiry instant onwards.
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        if now > self.last_access {
            self.last_access = now;
        }
        self.access_count += 1;
    }
}
