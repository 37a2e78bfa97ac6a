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

//! Cache configuration.

use std::time::Duration;

/// Default byte budget, 100 MiB.
const DEFAULT_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// Default item ceiling.
const DEFAULT_MAX_ITEMS: usize = 1000;

/// Upper bound of the sweep period.
const DEFAULT_SWEEP_CAP: Duration = Duration::from_secs(30);

/// Strategy used to pick the next entry to evict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Oldest last access first.
    #[default]
    Lru,
    /// Lowest access count first, least recently used among ties.
    Lfu,
    /// Oldest insertion first, regardless of access.
    Fifo,
    /// Largest entry first.
    Size,
    /// Lowest `last_access_ms + access_count * 1000` first, so entries that are
    /// used often outlive entries that were merely touched recently.
    FrequencyBoosted,
}

/// Limits and behavior of an [`AssetCache`](crate::AssetCache).
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use asset_cache::{CacheConfig, EvictionPolicy};
///
/// let config = CacheConfig::default()
///     .max_size_bytes(10 * 1024 * 1024)
///     .policy(EvictionPolicy::Lfu)
///     .default_ttl(Duration::from_secs(60));
/// assert_eq!(config.max_items, 1000);
/// ```
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Byte budget of the cache.
    pub max_size_bytes: u64,
    /// Maximum number of entries.
    pub max_items: usize,
    pub policy: EvictionPolicy,
    /// Time to live for entries inserted without one.
    pub default_ttl: Option<Duration>,
    /// The sweep runs every `min(ttl / 4, sweep_interval_cap)`.
    pub sweep_interval_cap: Duration,
    /// Size-to-budget ratio above which pressure observers fire.
    pub pressure_threshold: f64,
    /// Host heap ratio above which pressure observers fire.
    pub heap_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE,
            max_items: DEFAULT_MAX_ITEMS,
            policy: EvictionPolicy::Lru,
            default_ttl: None,
            sweep_interval_cap: DEFAULT_SWEEP_CAP,
            pressure_threshold: 0.9,
            heap_threshold: 0.8,
        }
    }
}

impl CacheConfig {
    pub fn max_size_bytes(mut self, size: u64) -> Self {
        self.max_size_bytes = size;
        self
    }

    pub fn max_items(mut self, items: usize) -> Self {
        self.max_items = items;
        self
    }

    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Period of the background sweep.
    pub fn sweep_interval(&self) -> Duration {
        match self.default_ttl {
            Some(ttl) => (ttl / 4).min(self.sweep_interval_cap).max(Duration::from_millis(1)),
            None => self.sweep_interval_cap,
        }
    }
}
