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

//! In-memory asset cache.
//!
//! This module implements the byte- and item-bounded cache used as the fast
//! tier by the orchestrator and the scene pipeline. All bookkeeping happens
//! under one lock; disposal, eviction hooks and pressure observers run after
//! the lock is released so they may call back into the cache.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use asset_core::{AssetError, HostTelemetry, LoadedAsset};
use asset_utils::asset_id::AssetId;
use asset_utils::lru::LruMap;
use asset_utils::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::data::{select_victim, ByteBudget, CacheEntry};
use crate::dispose::DisposerRegistry;
use crate::observe::{MemoryPressure, PressureObservers};
use crate::stats::{CacheStats, Counters};

type EvictHook = Arc<dyn Fn(&AssetId, u64) + Send + Sync>;

/// Byte- and item-bounded asset cache with pluggable eviction.
///
/// Entries expire after their time to live and are purged lazily on access
/// or by the background sweep started with [`AssetCache::start`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use asset_cache::{AssetCache, CacheConfig};
/// use asset_core::{AssetDescriptor, AssetKind, LoadedAsset, Payload};
///
/// let cache = AssetCache::new(CacheConfig::default().max_size_bytes(1024));
/// let desc = Arc::new(AssetDescriptor::new("a", AssetKind::Other, "a.bin"));
/// let asset = Arc::new(LoadedAsset::loaded(desc.clone(), Payload::Binary(vec![0; 16]), 16));
/// cache.set(desc.id.clone(), asset).unwrap();
/// assert!(cache.get(&desc.id).is_some());
/// assert_eq!(cache.stats().hits, 1);
/// ```
pub struct AssetCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
    disposers: DisposerRegistry,
    pressure: PressureObservers,
    evict_hook: Mutex<Option<EvictHook>>,
    telemetry: Mutex<Option<Arc<dyn HostTelemetry>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    /// Reference point for millisecond scores.
    epoch: Instant,
}

struct CacheInner {
    entries: LruMap<AssetId, CacheEntry>,
    budget: ByteBudget,
    counters: Counters,
    next_seq: u64,
}

/// Assets removed under the lock, disposed once it is released.
#[derive(Default)]
struct Released {
    evicted: Vec<(AssetId, Arc<LoadedAsset>)>,
    dropped: Vec<Arc<LoadedAsset>>,
}

impl CacheInner {
    fn remove(&mut self, id: &AssetId) -> Option<CacheEntry> {
        let entry = self.entries.remove(id)?;
        self.budget.release(entry.size_bytes);
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant, released: &mut Released) -> usize {
        let expired: Vec<AssetId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired.iter() {
            if let Some(entry) = self.remove(id) {
                released.dropped.push(entry.asset);
            }
        }
        expired.len()
    }

    fn evict_one(&mut self, config: &CacheConfig, epoch: Instant, released: &mut Released) -> bool {
        let Some(id) = select_victim(&self.entries, config.policy, epoch) else {
            return false;
        };
        match self.remove(&id) {
            Some(entry) => {
                self.counters.evictions += 1;
                released.evicted.push((id, entry.asset));
                true
            }
            None => false,
        }
    }

    fn evict(
        &mut self,
        target: Option<u64>,
        config: &CacheConfig,
        epoch: Instant,
        released: &mut Released,
    ) -> usize {
        match target {
            None => self.evict_one(config, epoch, released) as usize,
            Some(target) => {
                let mut count = 0;
                while self.budget.used() > target && self.evict_one(config, epoch, released) {
                    count += 1;
                }
                count
            }
        }
    }
}

impl AssetCache {
    /// Creates a cache with its own disposer registry.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_disposers(config, DisposerRegistry::new())
    }

    /// Creates a cache that disposes through a shared registry.
    pub fn with_disposers(config: CacheConfig, disposers: DisposerRegistry) -> Self {
        info!(
            "asset cache budget {} bytes, {} items, {:?}",
            config.max_size_bytes, config.max_items, config.policy
        );
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruMap::new(),
                budget: ByteBudget::new(config.max_size_bytes),
                counters: Counters::default(),
                next_seq: 0,
            }),
            config,
            disposers,
            pressure: PressureObservers::default(),
            evict_hook: Mutex::new(None),
            telemetry: Mutex::new(None),
            sweeper: Mutex::new(None),
            epoch: Instant::now(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Registry consulted whenever an asset leaves the cache.
    pub fn disposers(&self) -> &DisposerRegistry {
        &self.disposers
    }

    /// Inserts `asset` under `id` with the asset's or the default time to live.
    ///
    /// # Errors
    /// Returns a `Capacity` error, and leaves the cache untouched, when the
    /// asset alone is larger than the byte budget.
    pub fn set(&self, id: AssetId, asset: Arc<LoadedAsset>) -> Result<(), AssetError> {
        self.set_with_ttl(id, asset, None)
    }

    /// Inserts `asset` under `id`, expiring it after `ttl` when given.
    ///
    /// An existing entry for `id` is removed and disposed first. Room is made
    /// before the insert: one candidate is evicted when the item ceiling is
    /// reached, and candidates are evicted until the asset fits when the byte
    /// budget would be exceeded. Pressure observers are checked afterwards.
    pub fn set_with_ttl(
        &self,
        id: AssetId,
        asset: Arc<LoadedAsset>,
        ttl: Option<Duration>,
    ) -> Result<(), AssetError> {
        self.insert(id, asset, ttl, || true).map(|_| ())
    }

    /// Inserts `asset` under `id` only if `admit` returns `true`.
    ///
    /// `admit` runs under the cache lock, so a reader never observes an
    /// entry that `admit` would have refused at insert time. A refused asset
    /// is handed back untouched and is not disposed.
    ///
    /// # Returns
    /// `Ok(true)` if the asset was inserted, `Ok(false)` if it was refused.
    ///
    /// # Errors
    /// Same as [`AssetCache::set`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::atomic::{AtomicBool, Ordering};
    /// use std::sync::Arc;
    ///
    /// use asset_cache::{AssetCache, CacheConfig};
    /// use asset_core::{AssetDescriptor, AssetKind, LoadedAsset, Payload};
    ///
    /// let cache = AssetCache::new(CacheConfig::default());
    /// let desc = Arc::new(AssetDescriptor::new("a", AssetKind::Other, "a.bin"));
    /// let asset = Arc::new(LoadedAsset::loaded(desc, Payload::Binary(vec![1]), 1));
    /// let aborted = AtomicBool::new(true);
    /// let admitted = cache
    ///     .set_if("a".into(), asset, || !aborted.load(Ordering::SeqCst))
    ///     .unwrap();
    /// assert!(!admitted);
    /// assert!(cache.is_empty());
    /// ```
    pub fn set_if<F>(&self, id: AssetId, asset: Arc<LoadedAsset>, admit: F) -> Result<bool, AssetError>
    where
        F: FnOnce() -> bool,
    {
        self.insert(id, asset, None, admit)
    }

    fn insert<F>(
        &self,
        id: AssetId,
        asset: Arc<LoadedAsset>,
        ttl: Option<Duration>,
        admit: F,
    ) -> Result<bool, AssetError>
    where
        F: FnOnce() -> bool,
    {
        let size = asset.size_bytes;
        if size > self.config.max_size_bytes || self.config.max_items == 0 {
            error!(
                "reject {}: {} bytes over budget {}",
                id.brief(),
                size,
                self.config.max_size_bytes
            );
            return Err(AssetError::capacity(size, self.config.max_size_bytes).with_asset(id));
        }
        let ttl = ttl
            .or(asset.descriptor.options.ttl)
            .or(self.config.default_ttl);

        let mut released = Released::default();
        let now = Instant::now();
        let (current, max) = {
            let mut inner = self.inner.lock().unwrap();
            if !admit() {
                debug!("cache refused {}", id.brief());
                return Ok(false);
            }
            if let Some(old) = inner.remove(&id) {
                if !Arc::ptr_eq(&old.asset, &asset) {
                    released.dropped.push(old.asset);
                }
            }

            let full = inner.entries.len() >= self.config.max_items;
            if full || size > inner.budget.available() {
                inner.purge_expired(now, &mut released);
            }
            if inner.entries.len() >= self.config.max_items {
                inner.evict(None, &self.config, self.epoch, &mut released);
            }
            if size > inner.budget.available() {
                let shortfall = size - inner.budget.available();
                let target = inner.budget.used().saturating_sub(shortfall);
                inner.evict(Some(target), &self.config, self.epoch, &mut released);
            }

            if !inner.budget.apply_cache_size(size) {
                drop(inner);
                error!("no room for {} after eviction", id.brief());
                self.finish(released);
                return Err(AssetError::capacity(size, self.config.max_size_bytes).with_asset(id));
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            debug!("cache set {} size {}", id.brief(), size);
            let entry = CacheEntry::new(asset, seq, now, ttl.map(|ttl| now + ttl));
            inner.entries.insert(id, entry);
            (inner.budget.used(), inner.budget.total())
        };
        self.finish(released);
        self.check_pressure_at(current, max);
        Ok(true)
    }

    /// Returns the asset under `id` and records a hit, or records a miss.
    ///
    /// An expired entry counts as a miss and is purged.
    pub fn get(&self, id: &AssetId) -> Option<Arc<LoadedAsset>> {
        let now = Instant::now();
        let mut released = Released::default();
        let found = {
            let mut inner = self.inner.lock().unwrap();
            let expired = inner.entries.peek(id).is_some_and(|e| e.is_expired(now));
            let found = if expired {
                if let Some(entry) = inner.remove(id) {
                    debug!("{} expired", id.brief());
                    released.dropped.push(entry.asset);
                }
                None
            } else {
                inner.entries.get_mut(id).map(|entry| {
                    entry.touch(now);
                    entry.asset.clone()
                })
            };
            match found {
                Some(_) => inner.counters.hits += 1,
                None => inner.counters.misses += 1,
            }
            found
        };
        self.finish(released);
        found
    }

    /// Returns the asset under `id` without touching statistics or recency.
    pub fn peek(&self, id: &AssetId) -> Option<Arc<LoadedAsset>> {
        let now = Instant::now();
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .peek(id)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.asset.clone())
    }

    /// Checks whether a live entry exists for `id`, purging it if expired.
    pub fn has(&self, id: &AssetId) -> bool {
        let now = Instant::now();
        let mut released = Released::default();
        let live = {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.peek(id).map(|e| e.is_expired(now)) {
                Some(true) => {
                    if let Some(entry) = inner.remove(id) {
                        released.dropped.push(entry.asset);
                    }
                    false
                }
                Some(false) => true,
                None => false,
            }
        };
        self.finish(released);
        live
    }

    /// Removes and disposes the entry for `id`.
    ///
    /// # Returns
    /// `true` if an entry was removed.
    pub fn delete(&self, id: &AssetId) -> bool {
        let removed = self.inner.lock().unwrap().remove(id);
        match removed {
            Some(entry) => {
                debug!("cache delete {}", id.brief());
                self.disposers.dispose(&entry.asset);
                true
            }
            None => false,
        }
    }

    /// Removes and disposes every entry. Counters are kept.
    pub fn clear(&self) {
        let mut released = Released::default();
        {
            let mut inner = self.inner.lock().unwrap();
            released
                .dropped
                .extend(inner.entries.drain().map(|(_, entry)| entry.asset));
            inner.budget.reset();
        }
        info!("clear cache, {} entries", released.dropped.len());
        self.finish(released);
    }

    /// Evicts entries under the configured policy.
    ///
    /// Without a target exactly one candidate is evicted. With a target,
    /// candidates are evicted until the cache holds at most `target` bytes or
    /// nothing is left.
    ///
    /// # Returns
    /// The number of evicted entries.
    pub fn evict(&self, target: Option<u64>) -> usize {
        let mut released = Released::default();
        let count = self
            .inner
            .lock()
            .unwrap()
            .evict(target, &self.config, self.epoch, &mut released);
        self.finish(released);
        count
    }

    /// Purges every expired entry.
    ///
    /// # Returns
    /// The number of purged entries.
    pub fn purge_expired(&self) -> usize {
        let mut released = Released::default();
        let count = self
            .inner
            .lock()
            .unwrap()
            .purge_expired(Instant::now(), &mut released);
        self.finish(released);
        count
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            hits: inner.counters.hits,
            misses: inner.counters.misses,
            total_requests: inner.counters.hits + inner.counters.misses,
            evictions: inner.counters.evictions,
            item_count: inner.entries.len(),
            size_bytes: inner.budget.used(),
            max_size_bytes: inner.budget.total(),
        }
    }

    /// Ids of the cached entries, least recently used first.
    pub fn keys(&self) -> Vec<AssetId> {
        let inner = self.inner.lock().unwrap();
        inner.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().unwrap().budget.used()
    }

    /// Registers an observer told when the cache nears its budget or the
    /// host heap runs high.
    pub fn on_memory_pressure<F>(&self, callback: F)
    where
        F: Fn(&MemoryPressure) + Send + Sync + 'static,
    {
        self.pressure.add(Arc::new(callback));
    }

    /// Sets the hook called with the id and size of every evicted entry.
    pub fn set_evict_hook<F>(&self, hook: F)
    where
        F: Fn(&AssetId, u64) + Send + Sync + 'static,
    {
        *self.evict_hook.lock().unwrap() = Some(Arc::new(hook));
    }

    /// Sets the source of host heap readings used by pressure checks.
    pub fn set_telemetry(&self, telemetry: Arc<dyn HostTelemetry>) {
        *self.telemetry.lock().unwrap() = Some(telemetry);
    }

    /// Runs the pressure check against the current occupancy.
    pub fn check_memory_pressure(&self) {
        let (current, max) = {
            let inner = self.inner.lock().unwrap();
            (inner.budget.used(), inner.budget.total())
        };
        self.check_pressure_at(current, max);
    }

    /// Starts the periodic sweep on the current tokio runtime.
    ///
    /// The sweep purges expired entries and polls memory pressure every
    /// `min(ttl / 4, 30s)`. Calling `start` on a running cache does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().unwrap();
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let period = self.config.sweep_interval();
        info!("start cache sweep every {}ms", period.as_millis());
        let weak = Arc::downgrade(self);
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged != 0 {
                    debug!("sweep purged {} entries", purged);
                }
                cache.check_memory_pressure();
            }
        }));
    }

    /// Stops the periodic sweep.
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            info!("stop cache sweep");
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the sweep, drops observers and disposes every entry.
    pub fn destroy(&self) {
        self.stop();
        self.pressure.clear();
        self.clear();
    }

    fn finish(&self, released: Released) {
        if released.evicted.is_empty() && released.dropped.is_empty() {
            return;
        }
        let hook = self.evict_hook.lock().unwrap().clone();
        for (id, asset) in released.evicted {
            info!("evict {} size {}", id.brief(), asset.size_bytes);
            self.disposers.dispose(&asset);
            if let Some(hook) = hook.as_ref() {
                let res = panic::catch_unwind(AssertUnwindSafe(|| hook(&id, asset.size_bytes)));
                if res.is_err() {
                    error!("evict hook panicked for {}", id.brief());
                }
            }
        }
        for asset in released.dropped {
            self.disposers.dispose(&asset);
        }
    }

    fn check_pressure_at(&self, current: u64, max: u64) {
        let telemetry = self.telemetry.lock().unwrap().clone();
        let heap_ratio = telemetry.and_then(|t| t.heap_usage_ratio());
        let over_budget = max > 0 && current as f64 / max as f64 > self.config.pressure_threshold;
        let over_heap = heap_ratio.is_some_and(|ratio| ratio > self.config.heap_threshold);
        if over_budget || over_heap {
            info!(
                "memory pressure {}/{} bytes, heap {:?}",
                current, max, heap_ratio
            );
            self.pressure.notify(&MemoryPressure {
                current_size: current,
                max_size: max,
                heap_ratio,
            });
        }
    }
}

impl Drop for AssetCache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().ok().and_then(|s| s.take()) {
            handle.abort();
        }
    }
}
