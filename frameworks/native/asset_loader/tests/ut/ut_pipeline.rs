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

use std::io::Cursor;
use std::sync::atomic::AtomicUsize;

use async_trait::async_trait;
use asset_core::{LoadOptions, Payload, Priority};
use asset_utils::test::log::init;
use image::{ImageFormat, Rgba, RgbaImage};
use mockall::mock;

use super::*;
use crate::download::common::{FetchRequest, FetchResponse};
use crate::download::memory::{FetchEvent, MemoryTransport};
use crate::observe::{
    ASSET_EVICTED, ASSET_FAILED, ASSET_LOADED, ASSET_LOADING, ASSET_PROGRESS, BATCH_PROGRESS,
    CACHE_HIT, SCENE_LOADED,
};

mock! {
    pub Telemetry {}
    impl HostTelemetry for Telemetry {
        fn parallelism(&self) -> Option<usize>;
        fn heap_usage_ratio(&self) -> Option<f64>;
    }
}

fn blob(id: &str) -> AssetDescriptor {
    AssetDescriptor::new(id, AssetKind::Other, format!("mem://{}", id))
}

fn transport_with(ids: &[&str], size: usize) -> Arc<MemoryTransport> {
    let transport = Arc::new(MemoryTransport::new());
    for id in ids {
        transport.insert(format!("mem://{}", id), vec![3; size]);
    }
    transport
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn started(transport: &MemoryTransport) -> Vec<String> {
    transport
        .journal()
        .into_iter()
        .filter_map(|event| match event {
            FetchEvent::Started(uri) => Some(uri),
            _ => None,
        })
        .collect()
}

fn record(bus: &EventBus, name: &str) -> Arc<Mutex<Vec<AssetEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(name, move |event| sink.lock().unwrap().push(event.clone()));
    seen
}

fn counting_disposer(pipeline: &ScenePipeline, kind: AssetKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    pipeline.disposers().register(
        kind,
        Arc::new(move |_asset: &LoadedAsset| {
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    );
    count
}

// @tc.name: ut_pipeline_window_size
// @tc.desc: Test that the dispatch window follows the host parallelism
// @tc.precon: NA
// @tc.step: 1. Report several parallelism hints through a mocked telemetry
//           2. Read the window size for each
// @tc.expect: The window is half the hint clamped to [2, 8], and 2 without
//             telemetry
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[test]
fn ut_pipeline_window_size() {
    init();
    let pipeline = ScenePipeline::new(
        PipelineConfig::default(),
        Arc::new(MemoryTransport::new()),
    );
    assert_eq!(2, pipeline.window_size());

    let cases: [(Option<usize>, usize); 5] =
        [(Some(16), 8), (Some(64), 8), (Some(1), 2), (Some(10), 5), (None, 2)];
    for (hint, window) in cases {
        let mut telemetry = MockTelemetry::new();
        telemetry.expect_parallelism().returning(move || hint);
        telemetry.expect_heap_usage_ratio().returning(|| None);
        pipeline.set_telemetry(Arc::new(telemetry));
        assert_eq!(window, pipeline.window_size(), "hint {:?}", hint);
    }
}

// @tc.name: ut_pipeline_tier_order
// @tc.desc: Test that assets are dispatched by priority tier, one window at
//           a time
// @tc.precon: NA
// @tc.step: 1. Load a scene of five assets across four tiers with window 2
//           2. Read the order in which transfers started
// @tc.expect: Critical assets start first, then high and normal, then low,
//             and a duplicate id is loaded once
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_pipeline_tier_order() {
    init();
    let transport = transport_with(&["l1", "n1", "c1", "h1", "c2"], 16);
    transport.set_latency(Duration::from_millis(10));
    let pipeline = ScenePipeline::new(PipelineConfig::default(), transport.clone());

    let report = pipeline
        .load_scene(
            "castle",
            vec![
                blob("l1").priority(Priority::Low),
                blob("n1"),
                blob("c1").priority(Priority::Critical),
                blob("h1").priority(Priority::High),
                blob("c2").priority(Priority::Critical),
                blob("n1"),
            ],
        )
        .await;
    assert!(report.is_complete());
    assert_eq!(5, report.loaded.len());
    assert_eq!(5, transport.total_calls());

    let order = started(&transport);
    let window = |range: std::ops::Range<usize>| {
        let mut uris = order[range].to_vec();
        uris.sort();
        uris
    };
    assert_eq!(vec!["mem://c1", "mem://c2"], window(0..2));
    assert_eq!(vec!["mem://h1", "mem://n1"], window(2..4));
    assert_eq!(vec!["mem://l1"], window(4..5));
}

// @tc.name: ut_pipeline_scene_reuse
// @tc.desc: Test that a second scene reuses assets already cached
// @tc.precon: NA
// @tc.step: 1. Load a scene of two assets
//           2. Load another scene that shares one of them
// @tc.expect: The shared asset is a cache hit, only the new asset is fetched
//             and scene:loaded is emitted for both scenes
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_pipeline_scene_reuse() {
    init();
    let transport = transport_with(&["tree", "rock", "river"], 16);
    let pipeline = ScenePipeline::new(PipelineConfig::default(), transport.clone());
    let hits = Arc::new(Mutex::new(Vec::new()));
    let scenes = Arc::new(Mutex::new(Vec::new()));
    {
        let hits = hits.clone();
        pipeline.events().subscribe(CACHE_HIT, move |event| {
            hits.lock().unwrap().push(event.asset_id().cloned());
        });
        let scenes = scenes.clone();
        pipeline.events().subscribe(SCENE_LOADED, move |event| {
            if let AssetEvent::SceneLoaded(report) = event {
                scenes.lock().unwrap().push(report.scene.clone());
            }
        });
    }

    pipeline
        .load_scene("forest", vec![blob("tree"), blob("rock")])
        .await;
    let report = pipeline
        .load_scene("valley", vec![blob("rock"), blob("river")])
        .await;

    assert!(report.is_complete());
    assert_eq!(3, transport.total_calls());
    assert_eq!(1, transport.calls("mem://rock"));
    assert_eq!(vec![Some(AssetId::new("rock"))], *hits.lock().unwrap());
    assert_eq!(vec!["forest", "valley"], *scenes.lock().unwrap());
}

// @tc.name: ut_pipeline_texture_fallback
// @tc.desc: Test that a compressed texture that fails to decode falls back to
//           the uncompressed source
// @tc.precon: NA
// @tc.step: 1. Serve undecodable bytes as the compressed source and a PNG as
//              the fallback
//           2. Load a scene with the texture
// @tc.expect: The texture loads from the PNG and both sources were fetched
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_pipeline_texture_fallback() {
    init();
    let transport = Arc::new(MemoryTransport::new());
    transport.insert("mem://hero.ktx2", b"not a texture".to_vec());
    transport.insert("mem://hero.png", png(4, 2));
    let pipeline = ScenePipeline::new(PipelineConfig::default(), transport.clone());

    let hero = AssetDescriptor::new("hero", AssetKind::Texture, "mem://hero.ktx2")
        .fallback("mem://hero.png")
        .options(LoadOptions {
            compression: Some("ktx2".to_string()),
            ..Default::default()
        });
    let report = pipeline.load_scene("arena", vec![hero]).await;

    assert!(report.is_complete(), "{:?}", report.failed);
    assert_eq!(1, transport.calls("mem://hero.ktx2"));
    assert_eq!(1, transport.calls("mem://hero.png"));
    let asset = pipeline.get(&"hero".into()).unwrap();
    match &asset.payload {
        Payload::Texture(texture) => {
            assert_eq!((4, 2), (texture.width, texture.height));
            assert_eq!(4 * 2 * 4, texture.pixels.len());
        }
        other => panic!("unexpected payload {:?}", other.kind()),
    }
}

// @tc.name: ut_pipeline_texture_without_fallback
// @tc.desc: Test that an undecodable texture without fallback fails alone
// @tc.precon: NA
// @tc.step: 1. Load a scene with a corrupt texture and a valid blob
// @tc.expect: The texture is reported failed with a validation error and the
//             blob still loads
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_pipeline_texture_without_fallback() {
    init();
    let transport = transport_with(&["crate"], 8);
    transport.insert("mem://wall.png", b"corrupt".to_vec());
    let pipeline = ScenePipeline::new(PipelineConfig::default(), transport);

    let report = pipeline
        .load_scene(
            "dungeon",
            vec![
                AssetDescriptor::new("wall", AssetKind::Texture, "mem://wall.png"),
                blob("crate"),
            ],
        )
        .await;

    assert_eq!(vec![AssetId::new("crate")], report.loaded);
    assert_eq!(1, report.failed.len());
    let (id, err) = &report.failed[0];
    assert_eq!(&AssetId::new("wall"), id);
    assert_eq!(ErrorKind::Validation, err.kind());
    assert_eq!(Some(id), err.asset_id());
}

// @tc.name: ut_pipeline_frequency_eviction
// @tc.desc: Test that frequently used assets survive budget eviction
// @tc.precon: NA
// @tc.step: 1. Fill a 1000 byte budget to 800 bytes and read two assets
//              several times
//           2. Load a second scene that overflows the budget
// @tc.expect: One rarely used asset is evicted and disposed, the frequently
//             read assets stay cached and usage stays within the budget
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_pipeline_frequency_eviction() {
    init();
    let transport = transport_with(&["a", "b", "c", "d", "e", "f"], 200);
    let pipeline = ScenePipeline::new(
        PipelineConfig::default().max_memory_bytes(1000),
        transport,
    );
    let disposed = counting_disposer(&pipeline, AssetKind::Other);
    let evicted = Arc::new(AtomicUsize::new(0));
    {
        let evicted = evicted.clone();
        pipeline.events().subscribe(ASSET_EVICTED, move |_| {
            evicted.fetch_add(1, Ordering::SeqCst);
        });
    }

    pipeline
        .load_scene("one", vec![blob("a"), blob("b"), blob("c"), blob("d")])
        .await;
    assert_eq!(800, pipeline.cache().size_bytes());
    for _ in 0..3 {
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(pipeline.get(&"a".into()).is_some());
        assert!(pipeline.get(&"b".into()).is_some());
    }

    let report = pipeline.load_scene("two", vec![blob("e"), blob("f")]).await;
    assert!(report.is_complete());

    assert_eq!(1, disposed.load(Ordering::SeqCst));
    assert_eq!(1, evicted.load(Ordering::SeqCst));
    assert!(pipeline.cache().has(&"a".into()));
    assert!(pipeline.cache().has(&"b".into()));
    assert_eq!(5, pipeline.cache().len());
    assert!(pipeline.cache().size_bytes() <= 1000);
}

struct SwitchTransport {
    pending: Mutex<Vec<AbortSignal>>,
    violations: AtomicUsize,
}

#[async_trait]
impl Transport for SwitchTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, AssetError> {
        if request.uri.starts_with("mem://old-") {
            self.pending.lock().unwrap().push(request.abort.clone());
            tokio::select! {
                _ = request.abort.cancelled() => return Err(AssetError::cancelled()),
                _ = tokio::time::sleep(Duration::from_secs(10)) => {}
            }
        } else {
            let pending = self.pending.lock().unwrap();
            let live = pending.iter().filter(|abort| !abort.is_aborted()).count();
            self.violations.fetch_add(live, Ordering::SeqCst);
        }
        Ok(FetchResponse::ok(vec![5; 32]))
    }
}

// @tc.name: ut_pipeline_scene_switch
// @tc.desc: Test that starting a scene cancels the scene still loading
// @tc.precon: NA
// @tc.step: 1. Start a scene whose transfers stall
//           2. Start a second scene while the first is pending
// @tc.expect: Every transfer of the first scene is aborted before the second
//             scene fetches, the first scene reports all assets cancelled and
//             none of them is cached
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_pipeline_scene_switch() {
    init();
    let transport = Arc::new(SwitchTransport {
        pending: Mutex::new(Vec::new()),
        violations: AtomicUsize::new(0),
    });
    let pipeline = ScenePipeline::new(PipelineConfig::default(), transport.clone());
    let old = vec![blob("old-1"), blob("old-2"), blob("old-3")];
    let old_ids: Vec<AssetId> = old.iter().map(|d| d.id.clone()).collect();

    let first = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.load_scene("old", old).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(2, transport.pending.lock().unwrap().len());

    let report = pipeline
        .load_scene("new", vec![blob("new-1"), blob("new-2")])
        .await;
    let cancelled = first.await.unwrap();

    assert!(report.is_complete());
    assert_eq!(0, transport.violations.load(Ordering::SeqCst));
    assert!(cancelled.loaded.is_empty());
    assert!(cancelled.failed.is_empty());
    let mut ids = cancelled.cancelled.clone();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(old_ids, ids);
    for id in old_ids.iter() {
        assert!(!pipeline.cache().has(id));
    }
    assert!(!pipeline.cancel_current());
}

// @tc.name: ut_pipeline_destroy
// @tc.desc: Test that destroying the pipeline disposes every cached asset
// @tc.precon: NA
// @tc.step: 1. Load a scene of two assets
//           2. Destroy the pipeline
// @tc.expect: Both assets are disposed and the cache is empty
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_pipeline_destroy() {
    init();
    let transport = transport_with(&["x", "y"], 8);
    let pipeline = ScenePipeline::new(PipelineConfig::default(), transport);
    let disposed = counting_disposer(&pipeline, AssetKind::Other);

    pipeline.load_scene("small", vec![blob("x"), blob("y")]).await;
    assert_eq!(2, pipeline.stats().item_count);

    pipeline.destroy();
    assert_eq!(2, disposed.load(Ordering::SeqCst));
    assert!(pipeline.cache().is_empty());
    assert_eq!(0, pipeline.events().listener_count(SCENE_LOADED));
}

// @tc.name: ut_pipeline_window_bounds
// @tc.desc: Test that inverted window bounds never make sizing panic
// @tc.precon: NA
// @tc.step: 1. Configure the window as (4, 2) through the builder
//           2. Configure min 6 and max 3 through the fields
//           3. Read the window size of each pipeline
// @tc.expect: The builder raises max to min and the window is 4; the raw
//             fields read as a window of 6
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[test]
fn ut_pipeline_window_bounds() {
    init();
    let config = PipelineConfig::default().window(4, 2);
    assert_eq!((4, 4), (config.min_window, config.max_window));
    let pipeline = ScenePipeline::new(config, Arc::new(MemoryTransport::new()));
    assert_eq!(4, pipeline.window_size());

    let mut config = PipelineConfig::default();
    config.min_window = 6;
    config.max_window = 3;
    let pipeline = ScenePipeline::new(config, Arc::new(MemoryTransport::new()));
    assert_eq!(6, pipeline.window_size());
}

// @tc.name: ut_pipeline_asset_events
// @tc.desc: Test that a scene load reports every asset and its progress
//           on the event bus
// @tc.precon: NA
// @tc.step: 1. Serve one 64KiB asset and leave another missing
//           2. Load a scene with both while recording asset and batch
//              events
// @tc.expect: Both assets emit asset:loading, the served one emits progress
//             and asset:loaded, the missing one emits asset:failed, and
//             batch:progress counts both settles up to 1.0
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_pipeline_asset_events() {
    init();
    let transport = transport_with(&["terrain"], 64 * 1024);
    let pipeline = ScenePipeline::new(PipelineConfig::default(), transport);
    let bus = pipeline.events();
    let loading = record(bus, ASSET_LOADING);
    let progress = record(bus, ASSET_PROGRESS);
    let loaded = record(bus, ASSET_LOADED);
    let failed = record(bus, ASSET_FAILED);
    let batch = record(bus, BATCH_PROGRESS);

    let report = pipeline
        .load_scene("plains", vec![blob("terrain"), blob("missing")])
        .await;
    assert_eq!(1, report.loaded.len());
    assert_eq!(1, report.failed.len());

    let mut started: Vec<_> = loading
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| event.asset_id().cloned())
        .collect();
    started.sort();
    assert_eq!(vec![AssetId::new("missing"), AssetId::new("terrain")], started);

    let progress = progress.lock().unwrap();
    assert!(!progress.is_empty());
    assert!(progress
        .iter()
        .all(|event| event.asset_id() == Some(&AssetId::new("terrain"))));

    match loaded.lock().unwrap().as_slice() {
        [AssetEvent::AssetLoaded { id, size_bytes }] => {
            assert_eq!(&AssetId::new("terrain"), id);
            assert_eq!(64 * 1024, *size_bytes);
        }
        other => panic!("unexpected loaded events {:?}", other),
    }
    match failed.lock().unwrap().as_slice() {
        [AssetEvent::AssetFailed { id, error }] => {
            assert_eq!(&AssetId::new("missing"), id);
            assert_eq!(Some(404), error.status());
            assert_eq!(Some(id), error.asset_id());
        }
        other => panic!("unexpected failed events {:?}", other),
    }

    let batch = batch.lock().unwrap();
    let mut counts: Vec<_> = batch
        .iter()
        .map(|event| match event {
            AssetEvent::BatchProgress(progress) => (progress.total_assets, progress.loaded_assets),
            other => panic!("unexpected event {:?}", other.name()),
        })
        .collect();
    counts.sort();
    assert_eq!(vec![(2, 1), (2, 2)], counts);
    assert!(batch.iter().any(|event| matches!(
        event,
        AssetEvent::BatchProgress(progress) if progress.is_done() && progress.progress == 1.0
    )));
}
