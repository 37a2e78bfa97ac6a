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

//! Running cache statistics.

/// Snapshot of a cache's counters and occupancy.
///
/// Hit and miss rates are derived from the counters rather than stored.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub evictions: u64,
    pub item_count: usize,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
}

impl CacheStats {
    /// Fraction of `get` calls that hit; `0.0` before the first request.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.hits as f64 / self.total_requests as f64
    }

    /// Fraction of `get` calls that missed; `0.0` before the first request.
    pub fn miss_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.misses as f64 / self.total_requests as f64
    }
}

/// Mutable counters kept under the cache lock.
#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) evictions: u64,
}
