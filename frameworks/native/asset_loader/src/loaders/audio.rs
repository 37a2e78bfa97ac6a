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

//! Audio loader.

use std::sync::Arc;

use async_trait::async_trait;
use asset_core::{AssetDescriptor, AssetError, AssetKind, LoadedAsset, Payload};

use super::{fetch_bytes, AssetLoader, LoadContext, MediaDecoder};

/// Loads audio clips into interleaved f32 PCM.
pub struct AudioLoader {
    decoder: Arc<dyn MediaDecoder>,
}

impl AudioLoader {
    pub fn new(decoder: Arc<dyn MediaDecoder>) -> Self {
        Self { decoder }
    }
}

#[async_trait]
impl AssetLoader for AudioLoader {
    fn name(&self) -> &str {
        "audio"
    }

    fn can_load(&self, kind: AssetKind) -> bool {
        kind == AssetKind::Audio
    }

    async fn load(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        ctx: &LoadContext,
    ) -> Result<LoadedAsset, AssetError> {
        let bytes = fetch_bytes(descriptor, descriptor.resolve_source(), ctx).await?;
        let decoder = self.decoder.clone();
        let audio = tokio::task::spawn_blocking(move || decoder.decode_audio(&bytes))
            .await
            .map_err(|e| AssetError::validation(format!("decode task failed: {}", e)))??;
        let size = audio.estimated_size();
        Ok(LoadedAsset::loaded(descriptor.clone(), Payload::Audio(audio), size))
    }
}
