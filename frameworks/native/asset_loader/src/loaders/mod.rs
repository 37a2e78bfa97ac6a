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

//! Type-specific loaders.
//!
//! A loader turns an [`AssetDescriptor`] into a decoded [`LoadedAsset`]. All
//! loaders share [`fetch_bytes`], which runs the transfer under the retry
//! policy, the per-attempt timeout and the abort signal of the load.

mod audio;
mod binary;
mod media;
mod structured;
mod texture;

pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use asset_core::{AssetDescriptor, AssetError, AssetKind, LoadedAsset};
use asset_utils::debug;

pub use audio::AudioLoader;
pub use binary::BinaryLoader;
pub use media::{DefaultMediaDecoder, MediaDecoder};
pub use structured::StructuredLoader;
pub use texture::TextureLoader;

use crate::download::common::{AbortSignal, FetchRequest, ProgressSink, Transport};
use crate::retry::{with_retry, with_timeout, RetryConfig};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches and decodes one category of assets.
#[async_trait]
pub trait AssetLoader: Send + Sync {
    fn name(&self) -> &str;

    fn can_load(&self, kind: AssetKind) -> bool;

    /// Fetches and decodes `descriptor`.
    ///
    /// # Errors
    /// Transfer failures that survive the retry policy, decode and schema
    /// failures as `Validation`, and `Cancelled` once the context's abort
    /// signal fires.
    async fn load(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        ctx: &LoadContext,
    ) -> Result<LoadedAsset, AssetError>;
}

/// Everything a loader needs besides the descriptor.
#[derive(Clone)]
pub struct LoadContext {
    pub transport: Arc<dyn Transport>,
    pub retry: RetryConfig,
    /// Per-attempt timeout used when the descriptor sets none.
    pub timeout: Duration,
    pub abort: AbortSignal,
    pub progress: Option<ProgressSink>,
}

impl LoadContext {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            abort: AbortSignal::new(),
            progress: None,
        }
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn abort(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn progress(mut self, progress: ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Fetches the bytes at `uri` for `descriptor`.
///
/// Every attempt is bounded by the descriptor timeout (or the context
/// default) and the attempts are driven by the context retry policy, with
/// the descriptor's `max_retries` taking precedence. Error statuses become
/// `Transport` errors carrying the status. The whole sequence, backoff
/// sleeps included, stops as soon as the abort signal fires.
///
/// # Errors
/// The last attempt's error once retries are exhausted or a permanent error
/// is hit, or `Cancelled` on abort.
pub async fn fetch_bytes(
    descriptor: &AssetDescriptor,
    uri: &str,
    ctx: &LoadContext,
) -> Result<Vec<u8>, AssetError> {
    let mut retry = ctx.retry.clone();
    if let Some(max_retries) = descriptor.options.max_retries {
        retry.max_retries = max_retries;
    }
    let limit = descriptor.options.timeout.unwrap_or(ctx.timeout);
    let mut request = FetchRequest::new(uri)
        .headers(descriptor.options.headers.clone())
        .timeout(limit)
        .abort(ctx.abort.clone());
    if let Some(progress) = ctx.progress.clone() {
        request = request.progress(progress);
    }

    let attempts = with_retry(
        |attempt| {
            let transport = ctx.transport.clone();
            let request = request.clone();
            async move {
                if attempt > 0 {
                    debug!("refetch {} attempt {}", descriptor.id.brief(), attempt);
                }
                let response = with_timeout(transport.fetch(&request), limit).await?;
                if response.status >= 400 {
                    return Err(AssetError::transport(
                        format!("request failed with status {}", response.status),
                        Some(response.status),
                    ));
                }
                Ok(response.bytes)
            }
        },
        &retry,
    );
    // Polled in order: an aborted transfer settles through its own path.
    tokio::select! {
        biased;
        res = attempts => res,
        _ = ctx.abort.cancelled() => Err(AssetError::cancelled()),
    }
}

/// Loaders for every built-in category, decoding media with `decoder`.
pub fn default_loaders(decoder: Arc<dyn MediaDecoder>) -> Vec<Arc<dyn AssetLoader>> {
    vec![
        Arc::new(StructuredLoader::new()),
        Arc::new(TextureLoader::new(decoder.clone())),
        Arc::new(AudioLoader::new(decoder)),
        Arc::new(BinaryLoader::new()),
    ]
}

/// Extension of the path component of `uri`, lowercased.
pub(crate) fn extension(uri: &str) -> Option<String> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
