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

//! Texture loader.

use std::sync::Arc;

use async_trait::async_trait;
use asset_core::{AssetDescriptor, AssetError, AssetKind, LoadedAsset, Payload};

use super::{extension, fetch_bytes, AssetLoader, LoadContext, MediaDecoder};

/// Loads images into RGBA8 textures.
///
/// Decoding runs on the blocking pool so large images do not stall the
/// runtime.
pub struct TextureLoader {
    decoder: Arc<dyn MediaDecoder>,
}

impl TextureLoader {
    pub fn new(decoder: Arc<dyn MediaDecoder>) -> Self {
        Self { decoder }
    }

    /// Loads the texture of `descriptor` from `uri`, decoding with the
    /// format `hint`.
    pub(crate) async fn load_from(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        uri: &str,
        hint: Option<String>,
        ctx: &LoadContext,
    ) -> Result<LoadedAsset, AssetError> {
        let bytes = fetch_bytes(descriptor, uri, ctx).await?;
        let decoder = self.decoder.clone();
        let texture = tokio::task::spawn_blocking(move || decoder.decode_image(&bytes, hint.as_deref()))
            .await
            .map_err(|e| AssetError::validation(format!("decode task failed: {}", e)))??;
        let size = texture.estimated_size();
        Ok(LoadedAsset::loaded(
            descriptor.clone(),
            Payload::Texture(texture),
            size,
        ))
    }
}

#[async_trait]
impl AssetLoader for TextureLoader {
    fn name(&self) -> &str {
        "texture"
    }

    fn can_load(&self, kind: AssetKind) -> bool {
        kind == AssetKind::Texture
    }

    async fn load(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        ctx: &LoadContext,
    ) -> Result<LoadedAsset, AssetError> {
        let uri = descriptor.resolve_source();
        let hint = descriptor
            .options
            .compression
            .clone()
            .or_else(|| extension(uri));
        self.load_from(descriptor, uri, hint, ctx).await
    }
}
