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

use asset_core::{ErrorKind, LoadOptions, Payload};
use asset_utils::test::log::init;
use image::{ImageFormat, Rgba, RgbaImage};
use tokio::time::Instant;

use super::*;
use crate::download::memory::MemoryTransport;

fn descriptor(kind: AssetKind, uri: &str, options: LoadOptions) -> Arc<AssetDescriptor> {
    Arc::new(AssetDescriptor::new("a", kind, uri).options(options))
}

fn transient() -> AssetError {
    AssetError::transport("connection reset", None)
}

// @tc.name: ut_fetch_bytes_retries
// @tc.desc: Test that transient transfer failures are retried
// @tc.precon: NA
// @tc.step: 1. Serve a route failing its first two attempts
//           2. Fetch it with the default retry policy
// @tc.expect: The fetch succeeds after three transport calls
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_fetch_bytes_retries() {
    init();
    let transport = Arc::new(MemoryTransport::new());
    transport.insert("mem://a", vec![1, 2]);
    transport.fail_first("mem://a", 2, transient());
    let ctx = LoadContext::new(transport.clone());
    let desc = descriptor(AssetKind::Other, "mem://a", LoadOptions::default());
    assert_eq!(vec![1, 2], fetch_bytes(&desc, "mem://a", &ctx).await.unwrap());
    assert_eq!(3, transport.calls("mem://a"));
}

// @tc.name: ut_fetch_bytes_retry_override
// @tc.desc: Test the per-descriptor retry override and permanent errors
// @tc.precon: NA
// @tc.step: 1. Fetch a failing route with max_retries 0 on the descriptor
//           2. Fetch a missing route with the default policy
// @tc.expect: Each route is fetched exactly once; the missing route fails
//             with status 404
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_fetch_bytes_retry_override() {
    init();
    let transport = Arc::new(MemoryTransport::new());
    transport.insert_error("mem://flaky", transient());
    let ctx = LoadContext::new(transport.clone());
    let options = LoadOptions {
        max_retries: Some(0),
        ..Default::default()
    };
    let desc = descriptor(AssetKind::Other, "mem://flaky", options);
    let err = fetch_bytes(&desc, "mem://flaky", &ctx).await.unwrap_err();
    assert_eq!(ErrorKind::Transport, err.kind());
    assert_eq!(1, transport.calls("mem://flaky"));

    let desc = descriptor(AssetKind::Other, "mem://missing", LoadOptions::default());
    let err = fetch_bytes(&desc, "mem://missing", &ctx).await.unwrap_err();
    assert_eq!(Some(404), err.status());
    assert_eq!(1, transport.calls("mem://missing"));
}

// @tc.name: ut_fetch_bytes_timeout
// @tc.desc: Test the per-attempt timeout of a descriptor
// @tc.precon: NA
// @tc.step: 1. Serve a route with 10s latency
//           2. Fetch it with a 1s timeout and no retries
// @tc.expect: The fetch fails with a Timeout error
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_fetch_bytes_timeout() {
    init();
    let transport = Arc::new(MemoryTransport::new());
    transport.insert("mem://slow", vec![0]);
    transport.set_latency(Duration::from_secs(10));
    let options = LoadOptions {
        timeout: Some(Duration::from_secs(1)),
        max_retries: Some(0),
        ..Default::default()
    };
    let desc = descriptor(AssetKind::Other, "mem://slow", options);
    let err = fetch_bytes(&desc, "mem://slow", &LoadContext::new(transport))
        .await
        .unwrap_err();
    assert_eq!(ErrorKind::Timeout, err.kind());
}

// @tc.name: ut_fetch_bytes_abort_backoff
// @tc.desc: Test that an abort interrupts a backoff sleep
// @tc.precon: NA
// @tc.step: 1. Serve a route failing five times with a 10s initial delay
//           2. Abort one second after starting the fetch
// @tc.expect: The fetch fails with a cancellation well before the backoff
//             would have ended
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test(start_paused = true)]
async fn ut_fetch_bytes_abort_backoff() {
    init();
    let transport = Arc::new(MemoryTransport::new());
    transport.insert("mem://a", vec![1]);
    transport.fail_first("mem://a", 5, transient());
    let ctx = LoadContext::new(transport.clone())
        .retry(RetryConfig::default().initial_delay(Duration::from_secs(10)));
    let abort = ctx.abort.clone();
    let start = Instant::now();
    let handle = tokio::spawn(async move {
        let desc = descriptor(AssetKind::Other, "mem://a", LoadOptions::default());
        fetch_bytes(&desc, "mem://a", &ctx).await
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    abort.abort();
    let err = handle.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(1, transport.calls("mem://a"));
}

// @tc.name: ut_uri_extension
// @tc.desc: Test extracting the extension of a URI
// @tc.precon: NA
// @tc.step: 1. Extract extensions from paths, URLs and names without one
// @tc.expect: Lowercased extensions, ignoring query strings and dotfiles
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[test]
fn ut_uri_extension() {
    init();
    assert_eq!(Some("png".to_string()), extension("https://cdn/a/hero.PNG?v=2"));
    assert_eq!(Some("ktx2".to_string()), extension("file:///tex/hero.ktx2"));
    assert_eq!(None, extension("mem://blob"));
    assert_eq!(None, extension("/assets/.hidden"));
    assert_eq!(None, extension("https://cdn.example/dir/name"));
}

// @tc.name: ut_default_loaders
// @tc.desc: Test that the built-in loaders cover every category
// @tc.precon: NA
// @tc.step: 1. Build the default loaders
//           2. Find a loader for each asset kind
// @tc.expect: Every kind has exactly one loader
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[test]
fn ut_default_loaders() {
    init();
    let loaders = default_loaders(Arc::new(DefaultMediaDecoder));
    for kind in [
        AssetKind::StructuredData,
        AssetKind::Texture,
        AssetKind::Audio,
        AssetKind::Other,
    ] {
        assert_eq!(1, loaders.iter().filter(|l| l.can_load(kind)).count());
    }
}

// @tc.name: ut_texture_and_binary_loaders
// @tc.desc: Test loading a texture and a binary blob
// @tc.precon: NA
// @tc.step: 1. Serve a 4x4 PNG and a raw blob
//           2. Load them with the texture and binary loaders
// @tc.expect: The texture is decoded with a w*h*4 size and the blob is
//             returned as is
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[tokio::test]
async fn ut_texture_and_binary_loaders() {
    init();
    let mut png = Cursor::new(Vec::new());
    RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 4]))
        .write_to(&mut png, ImageFormat::Png)
        .unwrap();
    let transport = Arc::new(MemoryTransport::new());
    transport.insert("mem://hero.png", png.into_inner());
    transport.insert("mem://blob", vec![9; 5]);
    let ctx = LoadContext::new(transport);

    let texture = TextureLoader::new(Arc::new(DefaultMediaDecoder))
        .load(
            &descriptor(AssetKind::Texture, "mem://hero.png", LoadOptions::default()),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(64, texture.size_bytes);
    assert!(matches!(texture.payload, Payload::Texture(ref t) if t.width == 4));

    let blob = BinaryLoader::new()
        .load(
            &descriptor(AssetKind::Other, "mem://blob", LoadOptions::default()),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(5, blob.size_bytes);
    assert_eq!(Payload::Binary(vec![9; 5]), blob.payload);
}
