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

//! Type-aware disposal of evicted assets.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use asset_core::{AssetKind, Disposable, LoadedAsset};
use asset_utils::{debug, error};

/// Cleanup function for one asset category.
pub type Disposer = Arc<dyn Fn(&LoadedAsset) + Send + Sync>;

/// Maps asset categories to their cleanup functions.
///
/// Consulted on every eviction, delete, expiry and teardown. A category with
/// no registered disposer falls back to the payload's own [`Disposable`]
/// implementation, which is a no-op for payloads without host resources.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use asset_cache::DisposerRegistry;
/// use asset_core::AssetKind;
///
/// let registry = DisposerRegistry::new();
/// registry.register(AssetKind::Texture, Arc::new(|asset| {
///     println!("free gpu texture {}", asset.descriptor.id);
/// }));
/// assert!(registry.contains(AssetKind::Texture));
/// ```
#[derive(Clone, Default)]
pub struct DisposerRegistry {
    disposers: Arc<RwLock<HashMap<AssetKind, Disposer>>>,
}

impl DisposerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the disposer for `kind`, replacing any previous one.
    pub fn register(&self, kind: AssetKind, disposer: Disposer) {
        self.disposers.write().unwrap().insert(kind, disposer);
    }

    pub fn unregister(&self, kind: AssetKind) -> bool {
        self.disposers.write().unwrap().remove(&kind).is_some()
    }

    pub fn contains(&self, kind: AssetKind) -> bool {
        self.disposers.read().unwrap().contains_key(&kind)
    }

    /// Releases the host resources of `asset`.
    pub fn dispose(&self, asset: &LoadedAsset) {
        let disposer = self.disposers.read().unwrap().get(&asset.kind()).cloned();
        debug!("dispose {}", asset.descriptor.id.brief());
        let res = panic::catch_unwind(AssertUnwindSafe(|| match disposer {
            Some(disposer) => disposer(asset),
            None => asset.payload.dispose(),
        }));
        if let Err(e) = res {
            error!("disposer for {} panicked: {:?}", asset.descriptor.id.brief(), e);
        }
    }
}
