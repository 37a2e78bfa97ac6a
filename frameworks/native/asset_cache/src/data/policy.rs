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

//! Eviction candidate selection.

use asset_utils::asset_id::AssetId;
use asset_utils::lru::LruMap;
use tokio::time::Instant;

use super::CacheEntry;
use crate::config::EvictionPolicy;

/// Access count weight of the frequency-boosted score, in milliseconds.
const FREQUENCY_BOOST_MS: u64 = 1000;

/// Picks the next entry to evict under `policy`.
///
/// `entries` iterates from least to most recently used, so ties between
/// candidates always resolve to the least recently used one.
pub(crate) fn select_victim(
    entries: &LruMap<AssetId, CacheEntry>,
    policy: EvictionPolicy,
    epoch: Instant,
) -> Option<AssetId> {
    let victim = match policy {
        EvictionPolicy::Lru => entries.front(),
        EvictionPolicy::Lfu => first_min_by_key(entries, |e| e.access_count),
        EvictionPolicy::Fifo => first_min_by_key(entries, |e| e.seq),
        EvictionPolicy::Size => first_min_by_key(entries, |e| u64::MAX - e.size_bytes),
        EvictionPolicy::FrequencyBoosted => first_min_by_key(entries, |e| {
            let last_access_ms = e.last_access.saturating_duration_since(epoch).as_millis() as u64;
            last_access_ms.saturating_add(e.access_count.saturating_mul(FREQUENCY_BOOST_MS))
        }),
    };
    victim.map(|(id, _)| id.clone())
}

fn first_min_by_key<'a, F>(
    entries: &'a LruMap<AssetId, CacheEntry>,
    key: F,
) -> Option<(&'a AssetId, &'a CacheEntry)>
where
    F: Fn(&CacheEntry) -> u64,
{
    let mut best: Option<(&AssetId, &CacheEntry, u64)> = None;
    for (id, entry) in entries.iter() {
        let score = key(entry);
        match best {
            Some((_, _, current)) if current <= score => {}
            _ => best = Some((id, entry, score)),
        }
    }
    best.map(|(id, entry, _)| (id, entry))
}
