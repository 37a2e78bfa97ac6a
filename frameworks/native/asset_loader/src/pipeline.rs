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

//! Priority scene pipeline.
//!
//! Loads the working set of one scene in priority order, a window of assets
//! at a time, into a frequency-boosted cache. Starting a new scene aborts
//! everything still pending for the previous one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use asset_cache::{AssetCache, CacheConfig, CacheStats, DisposerRegistry, EvictionPolicy};
use asset_core::{
    AssetDescriptor, AssetError, AssetId, AssetKind, ErrorKind, HostTelemetry, LoadedAsset,
};
use asset_utils::{debug, error, info, warn};
use tokio::time::Instant;

use crate::download::callback::ProgressReporter;
use crate::download::common::{AbortSignal, Transport};
use crate::info::{BatchProgress, SceneReport};
use crate::loaders::{
    default_loaders, extension, AssetLoader, DefaultMediaDecoder, LoadContext, MediaDecoder,
    TextureLoader,
};
use crate::observe::{AssetEvent, EventBus};
use crate::retry::RetryConfig;

const DEFAULT_MAX_MEMORY: u64 = 256 * 1024 * 1024;
const DEFAULT_EVICT_RATIO: f64 = 0.8;
const DEFAULT_MIN_WINDOW: usize = 2;
const DEFAULT_MAX_WINDOW: usize = 8;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Parallelism assumed when the host reports none.
const DEFAULT_PARALLELISM: usize = 4;

/// Settings of a [`ScenePipeline`].
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Byte budget of the pipeline cache.
    pub max_memory_bytes: u64,
    /// Share of the budget eviction frees down to when an insert would
    /// overflow it.
    pub evict_target_ratio: f64,
    pub min_window: usize,
    pub max_window: usize,
    /// Per-attempt timeout for descriptors that set none.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: DEFAULT_MAX_MEMORY,
            evict_target_ratio: DEFAULT_EVICT_RATIO,
            min_window: DEFAULT_MIN_WINDOW,
            max_window: DEFAULT_MAX_WINDOW,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn max_memory_bytes(mut self, size: u64) -> Self {
        self.max_memory_bytes = size;
        self
    }

    pub fn evict_target_ratio(mut self, ratio: f64) -> Self {
        self.evict_target_ratio = ratio;
        self
    }

    /// Sets the window bounds. A `max` below `min` is raised to `min`.
    pub fn window(mut self, min: usize, max: usize) -> Self {
        self.min_window = min;
        self.max_window = max.max(min);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Cancellation token of the scene being loaded.
#[derive(Clone)]
struct SceneToken {
    id: u64,
    scene: String,
    abort: AbortSignal,
}

/// Scene loader with tiered dispatch and a frequency-boosted cache.
///
/// Cloning the pipeline shares its state.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use asset_core::{AssetDescriptor, AssetKind, Priority};
/// use asset_loader::{MemoryTransport, PipelineConfig, ScenePipeline};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = Arc::new(MemoryTransport::new());
/// transport.insert("mem://music", vec![0; 16]);
/// transport.insert("mem://map", br#"{"w": 8}"#.to_vec());
/// let pipeline = ScenePipeline::new(PipelineConfig::default(), transport);
///
/// let report = pipeline
///     .load_scene(
///         "forest",
///         vec![
///             AssetDescriptor::new("music", AssetKind::Other, "mem://music"),
///             AssetDescriptor::new("map", AssetKind::StructuredData, "mem://map")
///                 .priority(Priority::Critical),
///         ],
///     )
///     .await;
/// assert!(report.is_complete());
/// assert!(pipeline.get(&"map".into()).is_some());
/// # }
/// ```
#[derive(Clone)]
pub struct ScenePipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    config: PipelineConfig,
    cache: Arc<AssetCache>,
    transport: Arc<dyn Transport>,
    loaders: Vec<Arc<dyn AssetLoader>>,
    texture: TextureLoader,
    telemetry: RwLock<Option<Arc<dyn HostTelemetry>>>,
    current: Mutex<Option<SceneToken>>,
    bus: EventBus,
    next_token: AtomicU64,
}

impl ScenePipeline {
    /// Creates a pipeline decoding media with [`DefaultMediaDecoder`].
    pub fn new(config: PipelineConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_decoder(config, transport, Arc::new(DefaultMediaDecoder))
    }

    pub fn with_decoder(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn MediaDecoder>,
    ) -> Self {
        let cache = Arc::new(AssetCache::new(
            CacheConfig::default()
                .max_size_bytes(config.max_memory_bytes)
                .max_items(usize::MAX)
                .policy(EvictionPolicy::FrequencyBoosted),
        ));
        let bus = EventBus::new();
        {
            let bus = bus.clone();
            cache.set_evict_hook(move |id, size_bytes| {
                bus.emit(&AssetEvent::AssetEvicted {
                    id: id.clone(),
                    size_bytes,
                })
            });
        }
        Self {
            inner: Arc::new(PipelineInner {
                config,
                cache,
                transport,
                loaders: default_loaders(decoder.clone()),
                texture: TextureLoader::new(decoder),
                telemetry: RwLock::new(None),
                current: Mutex::new(None),
                bus,
                next_token: AtomicU64::new(0),
            }),
        }
    }

    /// Sets the source of the parallelism hint and heap readings.
    pub fn set_telemetry(&self, telemetry: Arc<dyn HostTelemetry>) {
        self.inner.cache.set_telemetry(telemetry.clone());
        *self.inner.telemetry.write().unwrap() = Some(telemetry);
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.inner.cache
    }

    /// Registry run on every eviction and on teardown.
    pub fn disposers(&self) -> &DisposerRegistry {
        self.inner.cache.disposers()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Number of assets dispatched together: half the reported parallelism,
    /// clamped to the configured window bounds.
    pub fn window_size(&self) -> usize {
        let parallelism = self
            .inner
            .telemetry
            .read()
            .unwrap()
            .as_ref()
            .and_then(|telemetry| telemetry.parallelism())
            .unwrap_or(DEFAULT_PARALLELISM);
        let min = self.inner.config.min_window.max(1);
        let max = self.inner.config.max_window.max(min);
        (parallelism / 2).clamp(min, max)
    }

    /// Reads an asset through the pipeline cache, boosting its score.
    pub fn get(&self, id: &AssetId) -> Option<Arc<LoadedAsset>> {
        self.inner.cache.get(id)
    }

    /// Loads the working set of `scene`.
    ///
    /// Any scene still loading is cancelled first. Descriptors are
    /// deduplicated by id and dispatched by priority tier, critical first,
    /// one window at a time; each window settles before the next starts.
    /// Failures are reported per asset and never stop the scene.
    ///
    /// `batch:progress` is emitted each time an asset settles, cancelled
    /// assets included.
    pub async fn load_scene(&self, scene: &str, descriptors: Vec<AssetDescriptor>) -> SceneReport {
        let started = Instant::now();
        let token = self.begin(scene);
        let mut report = SceneReport::new(scene);

        let mut seen = HashSet::new();
        let mut work: Vec<Arc<AssetDescriptor>> = descriptors
            .into_iter()
            .filter(|descriptor| seen.insert(descriptor.id.clone()))
            .map(Arc::new)
            .collect();
        work.sort_by_key(|descriptor| descriptor.options.priority.weight());
        let window = self.window_size();
        let total = work.len();
        let settled = Arc::new(AtomicUsize::new(0));
        if total == 0 {
            self.inner
                .bus
                .emit(&AssetEvent::BatchProgress(BatchProgress::new(0, 0)));
        }
        info!(
            "load scene {} with {} assets, window {}",
            scene,
            work.len(),
            window
        );

        for chunk in work.chunks(window) {
            if token.abort.is_aborted() {
                report
                    .cancelled
                    .extend(chunk.iter().map(|descriptor| descriptor.id.clone()));
                let done = settled.fetch_add(chunk.len(), Ordering::AcqRel) + chunk.len();
                self.inner
                    .bus
                    .emit(&AssetEvent::BatchProgress(BatchProgress::new(total, done)));
                continue;
            }
            let handles: Vec<_> = chunk
                .iter()
                .map(|descriptor| {
                    let pipeline = self.clone();
                    let descriptor = descriptor.clone();
                    let token = token.clone();
                    let settled = settled.clone();
                    let id = descriptor.id.clone();
                    let task = async move {
                        let res = pipeline.load_one(descriptor, &token).await;
                        let done = settled.fetch_add(1, Ordering::AcqRel) + 1;
                        pipeline
                            .inner
                            .bus
                            .emit(&AssetEvent::BatchProgress(BatchProgress::new(total, done)));
                        res
                    };
                    (id, tokio::spawn(task))
                })
                .collect();
            for (id, handle) in handles {
                match handle.await {
                    Ok(Ok(_)) => report.loaded.push(id),
                    Ok(Err(e)) if e.is_cancelled() => report.cancelled.push(id),
                    Ok(Err(e)) => report.failed.push((id, e)),
                    Err(e) => {
                        let err = AssetError::new(ErrorKind::Io, e.to_string()).with_asset(id.clone());
                        report.failed.push((id, err));
                    }
                }
            }
        }

        report.elapsed = started.elapsed();
        self.finish(&token);
        info!(
            "scene {}: {} loaded, {} failed, {} cancelled",
            scene,
            report.loaded.len(),
            report.failed.len(),
            report.cancelled.len()
        );
        self.inner.bus.emit(&AssetEvent::SceneLoaded(report.clone()));
        report
    }

    /// Cancels the scene being loaded, if any.
    pub fn cancel_current(&self) -> bool {
        let current = self.inner.current.lock().unwrap().take();
        match current {
            Some(token) => {
                info!("cancel scene {}", token.scene);
                token.abort.abort()
            }
            None => false,
        }
    }

    /// Cancels the current scene and disposes every cached asset.
    pub fn destroy(&self) {
        self.cancel_current();
        self.inner.cache.destroy();
        self.inner.bus.clear();
    }

    fn begin(&self, scene: &str) -> SceneToken {
        let token = SceneToken {
            id: self.inner.next_token.fetch_add(1, Ordering::Relaxed) + 1,
            scene: scene.to_string(),
            abort: AbortSignal::new(),
        };
        let previous = self.inner.current.lock().unwrap().replace(token.clone());
        if let Some(previous) = previous {
            info!("scene {} supersedes {}", scene, previous.scene);
            previous.abort.abort();
        }
        token
    }

    fn finish(&self, token: &SceneToken) {
        let mut current = self.inner.current.lock().unwrap();
        if current.as_ref().is_some_and(|c| c.id == token.id) {
            *current = None;
        }
    }

    async fn load_one(
        &self,
        descriptor: Arc<AssetDescriptor>,
        token: &SceneToken,
    ) -> Result<Arc<LoadedAsset>, AssetError> {
        let id = descriptor.id.clone();
        if let Some(asset) = self.inner.cache.get(&id) {
            debug!("scene cache hit {}", id.brief());
            self.inner.bus.emit(&AssetEvent::CacheHit { id });
            return Ok(asset);
        }
        self.inner.bus.emit(&AssetEvent::CacheMiss { id: id.clone() });
        self.inner
            .bus
            .emit(&AssetEvent::AssetLoading { id: id.clone() });

        let result = match self.fetch(&descriptor, token).await {
            Ok(asset) => self.commit(id.clone(), Arc::new(asset), token),
            Err(e) => Err(e),
        }
        .map_err(|e| e.with_asset(id.clone()));
        match &result {
            Ok(asset) => self.inner.bus.emit(&AssetEvent::AssetLoaded {
                id,
                size_bytes: asset.size_bytes,
            }),
            Err(e) if e.is_cancelled() => {
                debug!("{} cancelled with its scene", id.brief());
                self.inner.bus.emit(&AssetEvent::AssetCancelled { id });
            }
            Err(e) => {
                error!("{} failed: {}", id.brief(), e);
                self.inner.bus.emit(&AssetEvent::AssetFailed {
                    id,
                    error: e.clone(),
                });
            }
        }
        result
    }

    async fn fetch(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        token: &SceneToken,
    ) -> Result<LoadedAsset, AssetError> {
        let reporter = Arc::new(ProgressReporter::new(
            descriptor.id.clone(),
            self.inner.bus.clone(),
        ));
        let ctx = LoadContext::new(self.inner.transport.clone())
            .retry(self.inner.config.retry.clone())
            .timeout(self.inner.config.timeout)
            .abort(token.abort.clone())
            .progress(reporter.sink());
        match descriptor.kind {
            AssetKind::Texture => self.load_texture(descriptor, &ctx).await,
            kind => match self.inner.loaders.iter().find(|loader| loader.can_load(kind)) {
                Some(loader) => loader.load(descriptor, &ctx).await,
                None => Err(AssetError::unsupported(kind)),
            },
        }
    }

    /// Loads a texture from its preferred source, falling back to the
    /// uncompressed source when the preferred bytes do not decode.
    async fn load_texture(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        ctx: &LoadContext,
    ) -> Result<LoadedAsset, AssetError> {
        let primary = descriptor.resolve_source();
        let hint = descriptor
            .options
            .compression
            .clone()
            .or_else(|| extension(primary));
        let err = match self.inner.texture.load_from(descriptor, primary, hint, ctx).await {
            Err(e) if e.kind() == ErrorKind::Validation => e,
            res => return res,
        };
        match descriptor.source.fallback.as_deref() {
            Some(fallback) => {
                warn!(
                    "{} does not decode, falling back: {}",
                    descriptor.id.brief(),
                    err
                );
                self.inner
                    .texture
                    .load_from(descriptor, fallback, extension(fallback), ctx)
                    .await
            }
            None => Err(err),
        }
    }

    fn commit(
        &self,
        id: AssetId,
        asset: Arc<LoadedAsset>,
        token: &SceneToken,
    ) -> Result<Arc<LoadedAsset>, AssetError> {
        if token.abort.is_aborted() {
            self.inner.cache.disposers().dispose(&asset);
            return Err(AssetError::cancelled().with_asset(id));
        }
        let max = self.inner.config.max_memory_bytes;
        if self.inner.cache.size_bytes() + asset.size_bytes > max {
            let target = (max as f64 * self.inner.config.evict_target_ratio) as u64;
            let evicted = self.inner.cache.evict(Some(target));
            debug!("evicted {} assets to fit {}", evicted, id.brief());
        }
        match self
            .inner
            .cache
            .set_if(id.clone(), asset.clone(), || !token.abort.is_aborted())
        {
            Ok(true) => {}
            Ok(false) => {
                self.inner.cache.disposers().dispose(&asset);
                return Err(AssetError::cancelled().with_asset(id));
            }
            Err(e) => error!("{} not cached: {}", id.brief(), e),
        }
        Ok(asset)
    }
}
