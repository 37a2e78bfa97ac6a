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

use async_trait::async_trait;
use asset_cache::EvictionPolicy;
use asset_core::Payload;
use asset_utils::test::log::init;

use super::*;
use crate::download::common::{FetchRequest, FetchResponse};
use crate::download::memory::{FetchEvent, MemoryTransport};
use crate::observe::{
    ASSET_CANCELLED, ASSET_EVICTED, ASSET_FAILED, ASSET_LOADING, BATCH_PROGRESS, CACHE_CLEARED,
    CACHE_HIT, CACHE_MISS,
};

fn blob(id: &str) -> AssetDescriptor {
    AssetDescriptor::new(id, AssetKind::Other, format!("mem://{}", id))
}

fn record(bus: &EventBus, name: &str) -> Arc<Mutex<Vec<AssetEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(name, move |event| sink.lock().unwrap().push(event.clone()));
    seen
}

fn transport_with(ids: &[&str], size: usize) -> Arc<MemoryTransport> {
    let transport = Arc::new(MemoryTransport::new());
    for id in ids {
        transport.insert(format!("mem://{}", id), vec![7; size]);
    }
    transport
}

struct GateTransport {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Transport for GateTransport {
    async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResponse, AssetError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(FetchResponse::ok(vec![1; 8]))
    }
}

struct FixedLoader;

#[async_trait]
impl AssetLoader for FixedLoader {
    fn name(&self) -> &str {
        "fixed"
    }

    fn can_load(&self, kind: AssetKind) -> bool {
        kind == AssetKind::Other
    }

    async fn load(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        _ctx: &LoadContext,
    ) -> Result<LoadedAsset, AssetError> {
        Ok(LoadedAsset::loaded(
            descriptor.clone(),
            Payload::Binary(vec![42]),
            1,
        ))
    }
}

// @tc.name: ut_manager_dedup
// @tc.desc: Test that concurrent loads of one id share a single transfer
// @tc.precon: NA
// @tc.step: 1. Serve one asset with 100ms latency
//           2. Start five loads of it concurrently
// @tc.expect: The transport is called once, every load gets the same record
//             and asset:loading is emitted once
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_manager_dedup() {
    init();
    let transport = transport_with(&["hero"], 32);
    transport.set_latency(Duration::from_millis(100));
    let manager = AssetManager::new(ManagerConfig::default(), transport.clone());
    let loading = record(manager.events(), ASSET_LOADING);
    let misses = record(manager.events(), CACHE_MISS);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.load(blob("hero")).await })
        })
        .collect();
    let mut assets = Vec::new();
    for handle in handles {
        assets.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(1, transport.calls("mem://hero"));
    assert!(assets.iter().all(|a| Arc::ptr_eq(a, &assets[0])));
    assert_eq!(1, loading.lock().unwrap().len());
    assert_eq!(5, misses.lock().unwrap().len());
    assert_eq!(AssetState::Loaded, manager.get_state(&AssetId::new("hero")));
}

// @tc.name: ut_manager_cache_hit
// @tc.desc: Test that a loaded asset is served from the cache
// @tc.precon: NA
// @tc.step: 1. Load an asset twice in sequence
// @tc.expect: The second load is a cache hit and the transport is called once
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_cache_hit() {
    init();
    let transport = transport_with(&["a"], 4);
    let manager = AssetManager::new(ManagerConfig::default(), transport.clone());
    let hits = record(manager.events(), CACHE_HIT);
    let first = manager.load(blob("a")).await.unwrap();
    let second = manager.load(blob("a")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(1, transport.calls("mem://a"));
    assert_eq!(1, hits.lock().unwrap().len());
    assert!(manager.get(&AssetId::new("a")).is_some());
}

// @tc.name: ut_manager_unsupported
// @tc.desc: Test requesting a kind no loader accepts
// @tc.precon: NA
// @tc.step: 1. Create a manager without loaders
//           2. Load a texture
// @tc.expect: The load fails with UnsupportedType tagged with the id and the
//             transport is never called
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_unsupported() {
    init();
    let transport = transport_with(&["tex"], 4);
    let manager = AssetManager::empty(ManagerConfig::default(), transport.clone());
    let err = manager
        .load(AssetDescriptor::new("tex", AssetKind::Texture, "mem://tex"))
        .await
        .unwrap_err();
    assert_eq!(ErrorKind::UnsupportedType, err.kind());
    assert_eq!(Some(&AssetId::new("tex")), err.asset_id());
    assert_eq!(0, transport.total_calls());
    assert_eq!(AssetState::Unrequested, manager.get_state(&AssetId::new("tex")));
}

// @tc.name: ut_manager_failure
// @tc.desc: Test that terminal failures reject and emit asset:failed
// @tc.precon: NA
// @tc.step: 1. Load an asset whose route answers 404
// @tc.expect: The load fails with status 404 tagged with the id, one
//             asset:failed event is emitted and the state is Failed
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_failure() {
    init();
    let transport = Arc::new(MemoryTransport::new());
    let manager = AssetManager::new(ManagerConfig::default(), transport.clone());
    let failed = record(manager.events(), ASSET_FAILED);
    let err = manager.load(blob("gone")).await.unwrap_err();
    assert_eq!(Some(404), err.status());
    assert_eq!(Some(&AssetId::new("gone")), err.asset_id());
    assert_eq!(1, transport.calls("mem://gone"));
    let events = failed.lock().unwrap();
    assert_eq!(1, events.len());
    assert!(matches!(&events[0], AssetEvent::AssetFailed { error, .. } if error.status() == Some(404)));
    assert_eq!(AssetState::Failed, manager.get_state(&AssetId::new("gone")));
}

// @tc.name: ut_manager_retry
// @tc.desc: Test that transient failures are retried by the manager
// @tc.precon: NA
// @tc.step: 1. Serve an asset failing its first two attempts
//           2. Load it
// @tc.expect: The load succeeds after three transport calls
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_manager_retry() {
    init();
    let transport = transport_with(&["a"], 4);
    transport.fail_first("mem://a", 2, AssetError::transport("reset", None));
    let manager = AssetManager::new(ManagerConfig::default(), transport.clone());
    assert!(manager.load(blob("a")).await.is_ok());
    assert_eq!(3, transport.calls("mem://a"));
}

// @tc.name: ut_manager_batch_partial
// @tc.desc: Test that one failure does not stop a batch
// @tc.precon: NA
// @tc.step: 1. Load a batch of four assets, one of which is missing
// @tc.expect: Four results with three successes; batch progress reports
//             1..=4 settled and ends at 1.0
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_batch_partial() {
    init();
    let transport = transport_with(&["a", "b", "c"], 4);
    let manager = AssetManager::new(ManagerConfig::default(), transport);
    let progress = record(manager.events(), BATCH_PROGRESS);
    let results = manager
        .load_batch(vec![blob("a"), blob("b"), blob("missing"), blob("c")])
        .await;
    assert_eq!(4, results.len());
    assert_eq!(3, results.values().filter(|r| r.is_ok()).count());
    assert!(results[&AssetId::new("missing")].is_err());

    let mut settled: Vec<usize> = progress
        .lock()
        .unwrap()
        .iter()
        .map(|event| match event {
            AssetEvent::BatchProgress(p) => p.loaded_assets,
            _ => unreachable!(),
        })
        .collect();
    settled.sort();
    assert_eq!(vec![1, 2, 3, 4], settled);
}

// @tc.name: ut_manager_batch_all_fail
// @tc.desc: Test a batch where every item fails
// @tc.precon: NA
// @tc.step: 1. Load a batch of three missing assets
// @tc.expect: The batch resolves with three errors and progress reaches 1.0
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_batch_all_fail() {
    init();
    let manager = AssetManager::new(ManagerConfig::default(), Arc::new(MemoryTransport::new()));
    let progress = record(manager.events(), BATCH_PROGRESS);
    let results = manager
        .load_batch(vec![blob("x"), blob("y"), blob("z")])
        .await;
    assert_eq!(3, results.len());
    assert!(results.values().all(|r| r.is_err()));
    let done = progress
        .lock()
        .unwrap()
        .iter()
        .any(|event| matches!(event, AssetEvent::BatchProgress(p) if p.progress == 1.0));
    assert!(done);
}

// @tc.name: ut_manager_batch_empty
// @tc.desc: Test an empty batch
// @tc.precon: NA
// @tc.step: 1. Load an empty batch
// @tc.expect: No results and a single complete progress event
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_batch_empty() {
    init();
    let manager = AssetManager::new(ManagerConfig::default(), Arc::new(MemoryTransport::new()));
    let progress = record(manager.events(), BATCH_PROGRESS);
    assert!(manager.load_batch(Vec::new()).await.is_empty());
    let events = progress.lock().unwrap();
    assert_eq!(1, events.len());
    assert!(matches!(&events[0], AssetEvent::BatchProgress(p) if p.is_done()));
}

// @tc.name: ut_manager_concurrency_ceiling
// @tc.desc: Test that loads in flight never exceed the ceiling
// @tc.precon: NA
// @tc.step: 1. Create a manager allowing two concurrent loads
//           2. Load a batch of six assets through a transport tracking the
//              peak number of concurrent fetches
// @tc.expect: All six load and the peak is exactly two
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_manager_concurrency_ceiling() {
    init();
    let transport = Arc::new(GateTransport {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let manager = AssetManager::new(
        ManagerConfig::default().max_concurrent_loads(2),
        transport.clone(),
    );
    let batch = (0..6).map(|i| blob(&format!("a{}", i))).collect();
    let results = manager.load_batch(batch).await;
    assert!(results.values().all(|r| r.is_ok()));
    assert_eq!(2, transport.peak.load(Ordering::SeqCst));
}

// @tc.name: ut_manager_cancel
// @tc.desc: Test cancelling an in-flight load
// @tc.precon: NA
// @tc.step: 1. Start a load against a 10s latency
//           2. Cancel it after one second
//           3. Load the same id again with no latency
// @tc.expect: The first load fails as cancelled, the transfer is aborted,
//             nothing is cached, asset:cancelled is emitted once, a second
//             cancel returns false and the new load succeeds
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_manager_cancel() {
    init();
    let transport = transport_with(&["slow"], 4);
    transport.set_latency(Duration::from_secs(10));
    let manager = AssetManager::new(ManagerConfig::default(), transport.clone());
    let cancelled = record(manager.events(), ASSET_CANCELLED);
    let id = AssetId::new("slow");

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.load(blob("slow")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(AssetState::Loading, manager.get_state(&id));
    assert!(manager.cancel(&id));
    assert!(!manager.cancel(&id));

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(AssetState::Cancelled, manager.get_state(&id));
    assert!(!manager.cache().has(&id));
    assert_eq!(1, cancelled.lock().unwrap().len());
    assert_eq!(
        vec![
            FetchEvent::Started("mem://slow".to_string()),
            FetchEvent::Aborted("mem://slow".to_string()),
        ],
        transport.journal()
    );

    transport.set_latency(Duration::ZERO);
    assert!(manager.load(blob("slow")).await.is_ok());
    assert!(manager.is_loaded(&id));
}

// @tc.name: ut_manager_unload
// @tc.desc: Test unloading single assets and batches
// @tc.precon: NA
// @tc.step: 1. Load three assets
//           2. Unload one, then unload it again
//           3. Unload a batch holding two loaded ids and an unknown one
// @tc.expect: Unload returns true once then false; the batch count is two
//             and unloaded ids return to Unrequested
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_unload() {
    init();
    let transport = transport_with(&["a", "b", "c"], 4);
    let manager = AssetManager::new(ManagerConfig::default(), transport);
    manager
        .load_batch(vec![blob("a"), blob("b"), blob("c")])
        .await;
    let a = AssetId::new("a");
    assert!(manager.is_loaded(&a));
    assert!(manager.unload(&a));
    assert!(!manager.unload(&a));
    assert_eq!(AssetState::Unrequested, manager.get_state(&a));
    assert!(!manager.cache().has(&a));

    let ids = [AssetId::new("b"), AssetId::new("c"), AssetId::new("nope")];
    assert_eq!(2, manager.unload_batch(&ids));
    assert!(manager.cache().is_empty());
}

// @tc.name: ut_manager_memory_usage
// @tc.desc: Test memory accounting for cached and in-flight loads
// @tc.precon: NA
// @tc.step: 1. Load two 200-byte assets
//           2. Start a slow load with an expected size of 500 bytes
// @tc.expect: Cached bytes, item count and budget match the cache and the
//             in-flight load counts as active until it is cancelled
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_manager_memory_usage() {
    init();
    let transport = transport_with(&["a", "b", "big"], 200);
    let config = ManagerConfig::default().cache(CacheConfig::default().max_size_bytes(1000));
    let manager = AssetManager::new(config, transport.clone());
    manager.load_batch(vec![blob("a"), blob("b")]).await;

    transport.set_latency(Duration::from_secs(10));
    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.load(blob("big").expected_size(500)).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    let usage = manager.get_memory_usage();
    assert_eq!(
        MemoryUsage {
            total: 900,
            cached: 400,
            active: 500,
            max: 1000,
            item_count: 2,
        },
        usage
    );
    manager.cancel(&AssetId::new("big"));
    assert!(pending.await.unwrap().is_err());
    assert_eq!(0, manager.get_memory_usage().active);
}

// @tc.name: ut_manager_optimize_memory
// @tc.desc: Test explicit eviction down to the optimize target
// @tc.precon: NA
// @tc.step: 1. Fill a 1000-byte LRU cache with four 200-byte assets
//           2. Touch the first asset, then optimize memory
// @tc.expect: One entry is evicted to get under 700 bytes, it is the least
//             recently used one, asset:evicted is emitted and its state
//             returns to Unrequested
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_optimize_memory() {
    init();
    let ids = ["a", "b", "c", "d"];
    let transport = transport_with(&ids, 200);
    let cache = CacheConfig::default()
        .max_size_bytes(1000)
        .policy(EvictionPolicy::Lru);
    let manager = AssetManager::new(ManagerConfig::default().cache(cache), transport);
    let evicted = record(manager.events(), ASSET_EVICTED);
    for id in ids {
        manager.load(blob(id)).await.unwrap();
    }
    manager.load(blob("a")).await.unwrap();

    assert_eq!(1, manager.optimize_memory());
    assert_eq!(600, manager.get_memory_usage().cached);
    let events = evicted.lock().unwrap();
    assert_eq!(1, events.len());
    assert_eq!(Some(&AssetId::new("b")), events[0].asset_id());
    assert_eq!(AssetState::Unrequested, manager.get_state(&AssetId::new("b")));
    assert!(manager.is_loaded(&AssetId::new("a")));
}

// @tc.name: ut_manager_clear_cache
// @tc.desc: Test clearing the cache through the manager
// @tc.precon: NA
// @tc.step: 1. Load an asset, then clear the cache
// @tc.expect: cache:cleared is emitted, the asset is no longer loaded and
//             the next load fetches again
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_clear_cache() {
    init();
    let transport = transport_with(&["a"], 4);
    let manager = AssetManager::new(ManagerConfig::default(), transport.clone());
    let cleared = record(manager.events(), CACHE_CLEARED);
    manager.load(blob("a")).await.unwrap();
    manager.clear_cache();
    assert_eq!(1, cleared.lock().unwrap().len());
    assert!(!manager.is_loaded(&AssetId::new("a")));
    manager.load(blob("a")).await.unwrap();
    assert_eq!(2, transport.calls("mem://a"));
}

// @tc.name: ut_manager_uncached_load
// @tc.desc: Test a load that opts out of caching
// @tc.precon: NA
// @tc.step: 1. Load an asset with caching disabled twice
// @tc.expect: Both loads fetch, nothing is cached and the state is Loaded
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_uncached_load() {
    init();
    let transport = transport_with(&["a"], 4);
    let manager = AssetManager::new(ManagerConfig::default(), transport.clone());
    let mut desc = blob("a");
    desc.options.cache = false;
    manager.load(desc.clone()).await.unwrap();
    manager.load(desc).await.unwrap();
    assert_eq!(2, transport.calls("mem://a"));
    assert!(manager.cache().is_empty());
    assert!(manager.is_loaded(&AssetId::new("a")));
}

// @tc.name: ut_manager_register_loader
// @tc.desc: Test that a registered loader takes precedence
// @tc.precon: NA
// @tc.step: 1. Register a loader for binary assets on a default manager
//           2. Load a binary asset with no route
// @tc.expect: The registered loader answers without touching the transport
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_register_loader() {
    init();
    let transport = Arc::new(MemoryTransport::new());
    let manager = AssetManager::new(ManagerConfig::default(), transport.clone());
    manager.register_loader(Arc::new(FixedLoader));
    let asset = manager.load(blob("virtual")).await.unwrap();
    assert_eq!(Payload::Binary(vec![42]), asset.payload);
    assert_eq!(0, transport.total_calls());
}

// @tc.name: ut_manager_destroy
// @tc.desc: Test tearing down a manager with a load in flight
// @tc.precon: NA
// @tc.step: 1. Start a slow load and load one asset into the cache
//           2. Destroy the manager
//           3. Try another load
// @tc.expect: The pending load is cancelled, the cache is emptied and the
//             later load is rejected as cancelled
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_manager_destroy() {
    init();
    let transport = transport_with(&["a", "slow"], 4);
    let manager = AssetManager::new(ManagerConfig::default(), transport.clone());
    manager.start();
    manager.load(blob("a")).await.unwrap();
    transport.set_latency(Duration::from_secs(10));
    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.load(blob("slow")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.destroy();
    assert!(pending.await.unwrap().unwrap_err().is_cancelled());
    assert!(manager.cache().is_empty());
    assert!(!manager.cache().is_running());
    assert!(manager.load(blob("a")).await.unwrap_err().is_cancelled());
}

// @tc.name: ut_manager_cancel_after_admit
// @tc.desc: Test a cancel landing right after the asset entered the cache
// @tc.precon: NA
// @tc.step: 1. Use a 10 byte cache so inserting a 10 byte asset reports
//              memory pressure
//           2. Cancel the load from the memory:pressure handler, which runs
//              after the insert and before the load settles
// @tc.expect: The load fails as cancelled, the entry is gone from the cache
//             and the state is Cancelled
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_manager_cancel_after_admit() {
    init();
    let transport = transport_with(&["late"], 10);
    let manager = AssetManager::new(
        ManagerConfig::default().cache(CacheConfig::default().max_size_bytes(10)),
        transport,
    );
    let id = AssetId::new("late");
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let canceller = manager.clone();
        let fired = fired.clone();
        let id = id.clone();
        manager
            .events()
            .subscribe(crate::observe::MEMORY_PRESSURE, move |_| {
                if canceller.cancel(&id) {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            });
    }

    let err = manager.load(blob("late")).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(1, fired.load(Ordering::SeqCst));
    assert!(!manager.cache().has(&id));
    assert_eq!(AssetState::Cancelled, manager.get_state(&id));
}
