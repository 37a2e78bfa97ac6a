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

//! Lifecycle events and their publish/subscribe bus.
//!
//! Handlers subscribe by event name and run synchronously, in subscription
//! order, on the thread that emits. No component depends on a handler being
//! attached; a panicking handler is logged and skipped.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use asset_cache::MemoryPressure;
use asset_core::{AssetError, AssetId};
use asset_utils::error;

use crate::info::{BatchProgress, SceneReport};

pub const CACHE_HIT: &str = "cache:hit";
pub const CACHE_MISS: &str = "cache:miss";
pub const ASSET_LOADING: &str = "asset:loading";
pub const ASSET_PROGRESS: &str = "asset:progress";
pub const ASSET_LOADED: &str = "asset:loaded";
pub const ASSET_FAILED: &str = "asset:failed";
pub const ASSET_CANCELLED: &str = "asset:cancelled";
pub const ASSET_EVICTED: &str = "asset:evicted";
pub const BATCH_PROGRESS: &str = "batch:progress";
pub const SCENE_LOADED: &str = "scene:loaded";
pub const MEMORY_PRESSURE: &str = "memory:pressure";
pub const CACHE_CLEARED: &str = "cache:cleared";

/// Event published by the orchestrator and the pipeline.
#[derive(Clone, Debug)]
pub enum AssetEvent {
    CacheHit { id: AssetId },
    CacheMiss { id: AssetId },
    AssetLoading { id: AssetId },
    AssetProgress { id: AssetId, loaded: u64, total: Option<u64> },
    AssetLoaded { id: AssetId, size_bytes: u64 },
    AssetFailed { id: AssetId, error: AssetError },
    AssetCancelled { id: AssetId },
    AssetEvicted { id: AssetId, size_bytes: u64 },
    BatchProgress(BatchProgress),
    SceneLoaded(SceneReport),
    MemoryPressure(MemoryPressure),
    CacheCleared,
}

impl AssetEvent {
    /// Name handlers subscribe to.
    pub fn name(&self) -> &'static str {
        match self {
            AssetEvent::CacheHit { .. } => CACHE_HIT,
            AssetEvent::CacheMiss { .. } => CACHE_MISS,
            AssetEvent::AssetLoading { .. } => ASSET_LOADING,
            AssetEvent::AssetProgress { .. } => ASSET_PROGRESS,
            AssetEvent::AssetLoaded { .. } => ASSET_LOADED,
            AssetEvent::AssetFailed { .. } => ASSET_FAILED,
            AssetEvent::AssetCancelled { .. } => ASSET_CANCELLED,
            AssetEvent::AssetEvicted { .. } => ASSET_EVICTED,
            AssetEvent::BatchProgress(_) => BATCH_PROGRESS,
            AssetEvent::SceneLoaded(_) => SCENE_LOADED,
            AssetEvent::MemoryPressure(_) => MEMORY_PRESSURE,
            AssetEvent::CacheCleared => CACHE_CLEARED,
        }
    }

    /// Asset the event refers to, if it refers to one.
    pub fn asset_id(&self) -> Option<&AssetId> {
        match self {
            AssetEvent::CacheHit { id }
            | AssetEvent::CacheMiss { id }
            | AssetEvent::AssetLoading { id }
            | AssetEvent::AssetProgress { id, .. }
            | AssetEvent::AssetLoaded { id, .. }
            | AssetEvent::AssetFailed { id, .. }
            | AssetEvent::AssetCancelled { id }
            | AssetEvent::AssetEvicted { id, .. } => Some(id),
            _ => None,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&AssetEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, EventHandler)>>,
}

/// Registry of event name to ordered handler list.
///
/// Cloning the bus shares the registry.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use asset_core::AssetId;
/// use asset_loader::{AssetEvent, EventBus};
///
/// let bus = EventBus::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = hits.clone();
/// bus.subscribe("cache:hit", move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
/// bus.emit(&AssetEvent::CacheHit { id: AssetId::new("logo") });
/// assert_eq!(1, hits.load(Ordering::SeqCst));
/// ```
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the handlers of `name`.
    pub fn subscribe<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&AssetEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        SubscriptionId(id)
    }

    /// Removes a handler. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let mut registry = self.registry.lock().unwrap();
        for handlers in registry.handlers.values_mut() {
            if let Some(pos) = handlers.iter().position(|(id, _)| *id == subscription.0) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.registry
            .lock()
            .unwrap()
            .handlers
            .get(name)
            .map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.registry.lock().unwrap().handlers.clear();
    }

    /// Dispatches `event` to the handlers of its name.
    pub fn emit(&self, event: &AssetEvent) {
        let handlers: Vec<EventHandler> = match self.registry.lock().unwrap().handlers.get(event.name()) {
            Some(handlers) => handlers.iter().map(|(_, handler)| handler.clone()).collect(),
            None => return,
        };
        for handler in handlers {
            if let Err(e) = panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                error!("{} handler panicked: {:?}", event.name(), e);
            }
        }
    }
}
