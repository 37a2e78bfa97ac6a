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

//! Loader for opaque binary assets.

use std::sync::Arc;

use async_trait::async_trait;
use asset_core::{AssetDescriptor, AssetError, AssetKind, LoadedAsset, Payload};

use super::{fetch_bytes, AssetLoader, LoadContext};

#[derive(Default)]
pub struct BinaryLoader;

impl BinaryLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AssetLoader for BinaryLoader {
    fn name(&self) -> &str {
        "binary"
    }

    fn can_load(&self, kind: AssetKind) -> bool {
        kind == AssetKind::Other
    }

    async fn load(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        ctx: &LoadContext,
    ) -> Result<LoadedAsset, AssetError> {
        let bytes = fetch_bytes(descriptor, descriptor.resolve_source(), ctx).await?;
        let size = bytes.len() as u64;
        Ok(LoadedAsset::loaded(descriptor.clone(), Payload::Binary(bytes), size))
    }
}
