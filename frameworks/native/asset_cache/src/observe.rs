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

//! Memory-pressure observation.
//!
//! Observers registered here are told when a cache runs close to its byte
//! budget or the host reports a high heap ratio. A panicking observer is
//! logged and never allowed to unwind into a cache operation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use asset_utils::error;

/// State reported to pressure observers, taken after the triggering insert.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryPressure {
    /// Bytes held by the cache.
    pub current_size: u64,
    /// Byte budget of the cache.
    pub max_size: u64,
    /// Heap ratio reported by the host, if any.
    pub heap_ratio: Option<f64>,
}

pub(crate) type PressureCallback = Arc<dyn Fn(&MemoryPressure) + Send + Sync>;

#[derive(Default)]
pub(crate) struct PressureObservers {
    callbacks: Mutex<Vec<PressureCallback>>,
}

impl PressureObservers {
    pub(crate) fn add(&self, callback: PressureCallback) {
        self.callbacks.lock().unwrap().push(callback);
    }

    pub(crate) fn clear(&self) {
        self.callbacks.lock().unwrap().clear();
    }

    /// Notifies every observer; must be called without the cache lock held.
    pub(crate) fn notify(&self, pressure: &MemoryPressure) {
        let callbacks = self.callbacks.lock().unwrap().clone();
        for callback in callbacks {
            if let Err(e) = panic::catch_unwind(AssertUnwindSafe(|| callback(pressure))) {
                error!("memory pressure callback panicked: {:?}", e);
            }
        }
    }
}
