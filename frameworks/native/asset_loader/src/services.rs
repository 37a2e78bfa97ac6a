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

//! Load orchestrator.
//!
//! [`AssetManager`] is the entry point hosts load assets through. It checks
//! the cache, deduplicates concurrent requests for one id, bounds the number
//! of loads in flight, dispatches to the loader for the asset kind and
//! writes successful results back into the cache.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use asset_cache::{AssetCache, CacheConfig, DisposerRegistry};
use asset_core::{
    AssetDescriptor, AssetError, AssetId, AssetKind, AssetState, ErrorKind, LoadedAsset,
};
use asset_utils::{debug, error, info};
use tokio::sync::{oneshot, Semaphore};

use crate::download::callback::ProgressReporter;
use crate::download::common::Transport;
use crate::download::task::{LoadResult, LoadTask, TaskHandle};
use crate::info::{BatchProgress, MemoryUsage};
use crate::loaders::{default_loaders, AssetLoader, DefaultMediaDecoder, LoadContext};
use crate::observe::{AssetEvent, EventBus};
use crate::retry::RetryConfig;

const DEFAULT_MAX_CONCURRENT_LOADS: usize = 6;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_OPTIMIZE_RATIO: f64 = 0.7;

/// Settings of an [`AssetManager`].
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Loads allowed past the transfer stage at once.
    pub max_concurrent_loads: usize,
    /// Per-attempt timeout for descriptors that set none.
    pub default_timeout: Duration,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    /// Share of the cache budget `optimize_memory` evicts down to.
    pub optimize_target_ratio: f64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            default_timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            optimize_target_ratio: DEFAULT_OPTIMIZE_RATIO,
        }
    }
}

impl ManagerConfig {
    pub fn max_concurrent_loads(mut self, loads: usize) -> Self {
        self.max_concurrent_loads = loads;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn optimize_target_ratio(mut self, ratio: f64) -> Self {
        self.optimize_target_ratio = ratio;
        self
    }
}

#[derive(Clone, Copy)]
struct StateRecord {
    state: AssetState,
    /// Whether a `Loaded` result was meant to stay in the cache.
    cached: bool,
}

enum Ticket {
    Ready(Arc<LoadedAsset>),
    Waiting(oneshot::Receiver<LoadResult>),
}

/// Asset orchestrator with request deduplication and a concurrency ceiling.
///
/// Cloning the manager shares its state.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use asset_core::{AssetDescriptor, AssetKind, AssetState};
/// use asset_loader::{AssetManager, ManagerConfig, MemoryTransport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = Arc::new(MemoryTransport::new());
/// transport.insert("mem://level.json", br#"{"name": "forest"}"#.to_vec());
/// let manager = AssetManager::new(ManagerConfig::default(), transport);
///
/// let desc = AssetDescriptor::new("level", AssetKind::StructuredData, "mem://level.json");
/// let asset = manager.load(desc).await.unwrap();
/// assert_eq!(asset.size_bytes, 18);
/// assert_eq!(manager.get_state(&"level".into()), AssetState::Loaded);
/// # }
/// ```
#[derive(Clone)]
pub struct AssetManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ManagerConfig,
    cache: Arc<AssetCache>,
    loaders: RwLock<Vec<Arc<dyn AssetLoader>>>,
    transport: Arc<dyn Transport>,
    running: Mutex<HashMap<AssetId, LoadTask>>,
    states: Arc<Mutex<HashMap<AssetId, StateRecord>>>,
    permits: Arc<Semaphore>,
    bus: EventBus,
    next_seq: AtomicUsize,
}

impl AssetManager {
    /// Creates a manager with the built-in loaders.
    pub fn new(config: ManagerConfig, transport: Arc<dyn Transport>) -> Self {
        let manager = Self::empty(config, transport);
        for loader in default_loaders(Arc::new(DefaultMediaDecoder)).into_iter().rev() {
            manager.register_loader(loader);
        }
        manager
    }

    /// Creates a manager without loaders; every kind is unsupported until
    /// one is registered.
    pub fn empty(config: ManagerConfig, transport: Arc<dyn Transport>) -> Self {
        info!(
            "asset manager with {} concurrent loads",
            config.max_concurrent_loads
        );
        let cache = Arc::new(AssetCache::new(config.cache.clone()));
        let bus = EventBus::new();
        let states: Arc<Mutex<HashMap<AssetId, StateRecord>>> = Arc::new(Mutex::new(HashMap::new()));
        {
            let bus = bus.clone();
            let states = states.clone();
            cache.set_evict_hook(move |id, size_bytes| {
                let mut states = states.lock().unwrap();
                if states.get(id).is_some_and(|r| r.state == AssetState::Loaded) {
                    states.remove(id);
                }
                drop(states);
                bus.emit(&AssetEvent::AssetEvicted {
                    id: id.clone(),
                    size_bytes,
                });
            });
        }
        {
            let bus = bus.clone();
            cache.on_memory_pressure(move |pressure| bus.emit(&AssetEvent::MemoryPressure(*pressure)));
        }
        Self {
            inner: Arc::new(ManagerInner {
                permits: Arc::new(Semaphore::new(config.max_concurrent_loads.max(1))),
                config,
                cache,
                loaders: RwLock::new(Vec::new()),
                transport,
                running: Mutex::new(HashMap::new()),
                states,
                bus,
                next_seq: AtomicUsize::new(0),
            }),
        }
    }

    /// Registers `loader`. A later registration takes precedence for the
    /// kinds it accepts.
    pub fn register_loader(&self, loader: Arc<dyn AssetLoader>) {
        debug!("register loader {}", loader.name());
        self.inner.loaders.write().unwrap().insert(0, loader);
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.inner.cache
    }

    /// Registry consulted when cached assets are evicted or unloaded.
    pub fn disposers(&self) -> &DisposerRegistry {
        self.inner.cache.disposers()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Starts the periodic cache sweep.
    pub fn start(&self) {
        self.inner.cache.start();
    }

    /// Loads the asset described by `descriptor`.
    ///
    /// A cached copy is returned at once. A load already in flight for the
    /// same id is joined instead of started again.
    ///
    /// # Errors
    /// `UnsupportedType` before any I/O when no loader accepts the kind;
    /// otherwise the terminal error of the load, tagged with the asset id.
    pub async fn load(
        &self,
        descriptor: impl Into<Arc<AssetDescriptor>>,
    ) -> Result<Arc<LoadedAsset>, AssetError> {
        let descriptor = descriptor.into();
        let id = descriptor.id.clone();
        match self.submit(descriptor)? {
            Ticket::Ready(asset) => Ok(asset),
            Ticket::Waiting(rx) => rx
                .await
                .unwrap_or_else(|_| Err(AssetError::cancelled().with_asset(id))),
        }
    }

    /// Loads every descriptor concurrently and waits for all of them.
    ///
    /// One failure never stops the others. `batch:progress` is emitted after
    /// every settle, counting failures and cancellations as settled.
    /// Duplicate ids collapse into one entry of the result.
    pub async fn load_batch(
        &self,
        descriptors: Vec<AssetDescriptor>,
    ) -> HashMap<AssetId, Result<Arc<LoadedAsset>, AssetError>> {
        let total = descriptors.len();
        if total == 0 {
            self.inner
                .bus
                .emit(&AssetEvent::BatchProgress(BatchProgress::new(0, 0)));
            return HashMap::new();
        }
        info!("load batch of {}", total);
        let settled = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(total);
        for descriptor in descriptors {
            let id = descriptor.id.clone();
            let manager = self.clone();
            let settled = settled.clone();
            let handle = tokio::spawn(async move {
                let res = manager.load(descriptor).await;
                let done = settled.fetch_add(1, Ordering::AcqRel) + 1;
                manager
                    .inner
                    .bus
                    .emit(&AssetEvent::BatchProgress(BatchProgress::new(total, done)));
                res
            });
            handles.push((id, handle));
        }

        let mut results = HashMap::with_capacity(total);
        for (id, handle) in handles {
            let res = match handle.await {
                Ok(res) => res,
                Err(e) => {
                    error!("batch load of {} aborted: {}", id.brief(), e);
                    Err(AssetError::new(ErrorKind::Io, e.to_string()).with_asset(id.clone()))
                }
            };
            results.insert(id, res);
        }
        results
    }

    /// Returns the cached asset for `id`, counting a hit or a miss.
    pub fn get(&self, id: &AssetId) -> Option<Arc<LoadedAsset>> {
        self.inner.cache.get(id)
    }

    /// Aborts the in-flight load of `id`.
    ///
    /// # Returns
    /// `false` when nothing was in flight for `id`.
    pub fn cancel(&self, id: &AssetId) -> bool {
        let cancelled = {
            let mut running = self.inner.running.lock().unwrap();
            match running.get(id) {
                Some(task) if task.handle.cancel() => running.remove(id).is_some(),
                _ => false,
            }
        };
        if !cancelled {
            debug!("cancel {}: not in flight", id.brief());
            return false;
        }
        // The load may have been admitted to the cache just before the abort.
        self.inner.cache.delete(id);
        self.inner.states.lock().unwrap().insert(
            id.clone(),
            StateRecord {
                state: AssetState::Cancelled,
                cached: false,
            },
        );
        self.inner
            .bus
            .emit(&AssetEvent::AssetCancelled { id: id.clone() });
        true
    }

    /// Cancels any load of `id` and drops its cached copy.
    ///
    /// # Returns
    /// `false` when there was nothing to unload.
    pub fn unload(&self, id: &AssetId) -> bool {
        let cancelled = self.cancel(id);
        let removed = self.inner.cache.delete(id);
        self.inner.states.lock().unwrap().remove(id);
        if removed {
            info!("unload {}", id.brief());
        }
        cancelled || removed
    }

    /// Unloads every id and returns how many had something to unload.
    pub fn unload_batch(&self, ids: &[AssetId]) -> usize {
        ids.iter().filter(|id| self.unload(id)).count()
    }

    /// Position of `id` in the load state machine.
    pub fn get_state(&self, id: &AssetId) -> AssetState {
        if let Some(task) = self.inner.running.lock().unwrap().get(id) {
            return task.handle.state();
        }
        let record = self.inner.states.lock().unwrap().get(id).copied();
        match record {
            Some(StateRecord {
                state: AssetState::Loaded,
                cached: true,
            }) if !self.inner.cache.has(id) => AssetState::Unrequested,
            Some(record) => record.state,
            None => AssetState::Unrequested,
        }
    }

    pub fn is_loaded(&self, id: &AssetId) -> bool {
        self.get_state(id) == AssetState::Loaded
    }

    /// Bytes held by the cache plus the expected bytes of loads in flight.
    pub fn get_memory_usage(&self) -> MemoryUsage {
        let stats = self.inner.cache.stats();
        let active: u64 = self
            .inner
            .running
            .lock()
            .unwrap()
            .values()
            .map(|task| task.handle.expected_size())
            .sum();
        MemoryUsage {
            total: stats.size_bytes + active,
            cached: stats.size_bytes,
            active,
            max: stats.max_size_bytes,
            item_count: stats.item_count,
        }
    }

    /// Purges expired entries, then evicts down to the optimize target.
    ///
    /// # Returns
    /// The number of entries removed.
    pub fn optimize_memory(&self) -> usize {
        let purged = self.inner.cache.purge_expired();
        let target =
            (self.inner.cache.config().max_size_bytes as f64 * self.inner.config.optimize_target_ratio) as u64;
        let evicted = match self.inner.cache.size_bytes() > target {
            true => self.inner.cache.evict(Some(target)),
            false => 0,
        };
        info!("optimize memory: {} purged, {} evicted", purged, evicted);
        purged + evicted
    }

    /// Drops every cached asset. Loads in flight are not affected.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        self.inner
            .states
            .lock()
            .unwrap()
            .retain(|_, record| record.state != AssetState::Loaded);
        self.inner.bus.emit(&AssetEvent::CacheCleared);
    }

    /// Cancels every load, stops the sweep, disposes the cache and drops
    /// all subscribers. The manager rejects loads afterwards.
    pub fn destroy(&self) {
        let tasks: Vec<LoadTask> = self
            .inner
            .running
            .lock()
            .unwrap()
            .drain()
            .map(|(_, task)| task)
            .collect();
        info!("destroy asset manager, {} loads in flight", tasks.len());
        for task in tasks {
            task.handle.cancel();
        }
        self.inner.permits.close();
        self.inner.cache.destroy();
        self.inner.states.lock().unwrap().clear();
        self.inner.bus.clear();
    }

    fn find_loader(&self, kind: AssetKind) -> Option<Arc<dyn AssetLoader>> {
        self.inner
            .loaders
            .read()
            .unwrap()
            .iter()
            .find(|loader| loader.can_load(kind))
            .cloned()
    }

    fn submit(&self, descriptor: Arc<AssetDescriptor>) -> Result<Ticket, AssetError> {
        let id = descriptor.id.clone();
        let Some(loader) = self.find_loader(descriptor.kind) else {
            error!("no loader for {} ({})", id.brief(), descriptor.kind.as_str());
            return Err(AssetError::unsupported(descriptor.kind).with_asset(id));
        };
        if self.inner.permits.is_closed() {
            return Err(AssetError::cancelled().with_asset(id));
        }

        if let Some(asset) = self.inner.cache.get(&id) {
            debug!("cache hit {}", id.brief());
            self.inner.bus.emit(&AssetEvent::CacheHit { id });
            return Ok(Ticket::Ready(asset));
        }
        self.inner.bus.emit(&AssetEvent::CacheMiss { id: id.clone() });

        let (tx, rx) = oneshot::channel();
        let started = {
            let mut running = self.inner.running.lock().unwrap();
            match running.entry(id.clone()) {
                Entry::Occupied(mut entry) => match entry.get().handle.try_add_waiter(tx) {
                    Ok(()) => {
                        info!("join in-flight load {}", id.brief());
                        None
                    }
                    Err(tx) => {
                        if let Some(asset) = self.inner.cache.peek(&id) {
                            return Ok(Ticket::Ready(asset));
                        }
                        let task = self.new_task(&descriptor, tx);
                        let started = (task.handle.clone(), task.seq);
                        entry.insert(task);
                        Some(started)
                    }
                },
                Entry::Vacant(entry) => {
                    let task = self.new_task(&descriptor, tx);
                    let started = (task.handle.clone(), task.seq);
                    entry.insert(task);
                    Some(started)
                }
            }
        };

        if let Some((handle, seq)) = started {
            self.inner.bus.emit(&AssetEvent::AssetLoading { id });
            let manager = self.clone();
            tokio::spawn(async move { manager.run_load(descriptor, loader, handle, seq).await });
        }
        Ok(Ticket::Waiting(rx))
    }

    fn new_task(&self, descriptor: &AssetDescriptor, waiter: oneshot::Sender<LoadResult>) -> LoadTask {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let task = LoadTask::new(
            descriptor.id.clone(),
            seq,
            descriptor.expected_size.unwrap_or(0),
        );
        // A fresh handle is never finished.
        let _ = task.handle.try_add_waiter(waiter);
        task
    }

    async fn run_load(
        self,
        descriptor: Arc<AssetDescriptor>,
        loader: Arc<dyn AssetLoader>,
        handle: TaskHandle,
        seq: usize,
    ) {
        let id = descriptor.id.clone();
        let result = self
            .execute(&descriptor, loader, &handle)
            .await
            .map_err(|e| e.with_asset(id.clone()));
        let state = match &result {
            Ok(asset) => {
                info!("{} loaded, {} bytes", id.brief(), asset.size_bytes);
                self.inner.bus.emit(&AssetEvent::AssetLoaded {
                    id: id.clone(),
                    size_bytes: asset.size_bytes,
                });
                AssetState::Loaded
            }
            Err(e) if e.is_cancelled() => {
                info!("{} cancelled", id.brief());
                AssetState::Cancelled
            }
            Err(e) => {
                error!("{} failed: {}", id.brief(), e);
                self.inner.bus.emit(&AssetEvent::AssetFailed {
                    id: id.clone(),
                    error: e.clone(),
                });
                AssetState::Failed
            }
        };
        handle.complete(&result);
        self.task_finish(&id, seq, state, descriptor.options.cache);
    }

    async fn execute(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        loader: Arc<dyn AssetLoader>,
        handle: &TaskHandle,
    ) -> LoadResult {
        let abort = handle.abort_signal();
        let permit = tokio::select! {
            permit = self.inner.permits.clone().acquire_owned() => {
                permit.map_err(|_| AssetError::cancelled())?
            }
            _ = abort.cancelled() => return Err(AssetError::cancelled()),
        };
        handle.set_running();
        debug!("{} running with {}", handle.id().brief(), loader.name());

        let reporter = Arc::new(ProgressReporter::new(
            descriptor.id.clone(),
            self.inner.bus.clone(),
        ));
        let ctx = LoadContext::new(self.inner.transport.clone())
            .retry(self.inner.config.retry.clone())
            .timeout(self.inner.config.default_timeout)
            .abort(abort.clone())
            .progress(reporter.sink());
        let loaded = loader.load(descriptor, &ctx).await;
        drop(permit);
        let asset = Arc::new(loaded?);

        if abort.is_aborted() {
            self.inner.cache.disposers().dispose(&asset);
            return Err(AssetError::cancelled());
        }
        if descriptor.options.cache {
            let admitted = self
                .inner
                .cache
                .set_if(descriptor.id.clone(), asset.clone(), || !abort.is_aborted());
            match admitted {
                Ok(true) => {}
                Ok(false) => {
                    self.inner.cache.disposers().dispose(&asset);
                    return Err(AssetError::cancelled());
                }
                Err(e) => error!("{} not cached: {}", descriptor.id.brief(), e),
            }
            // An entry admitted before the abort is removed by `cancel`.
            if abort.is_aborted() {
                return Err(AssetError::cancelled());
            }
        }
        Ok(asset)
    }

    fn task_finish(&self, id: &AssetId, seq: usize, state: AssetState, cached: bool) {
        let mut running = self.inner.running.lock().unwrap();
        if running.get(id).is_some_and(|task| task.seq == seq) {
            running.remove(id);
            self.inner
                .states
                .lock()
                .unwrap()
                .insert(id.clone(), StateRecord { state, cached });
        }
    }
}
