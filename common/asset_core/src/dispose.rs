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

//! Release of host-managed resources.

use std::fmt::Debug;
use std::sync::Arc;

/// Capability of payloads that own resources outside the Rust heap.
///
/// GPU textures and audio buffers handed over by the host implement this so
/// eviction and unload can free them before the record is dropped.
pub trait Disposable: Send + Sync {
    /// Releases the underlying resource. Called at most once per eviction.
    fn dispose(&self);
}

/// Shared handle to a host resource attached to a decoded payload.
///
/// The handle never travels to the durable tier; a payload restored from disk
/// comes back without one.
#[derive(Clone)]
pub struct HostHandle(pub Arc<dyn Disposable>);

impl HostHandle {
    pub fn new(resource: impl Disposable + 'static) -> Self {
        Self(Arc::new(resource))
    }
}

impl Disposable for HostHandle {
    fn dispose(&self) {
        self.0.dispose();
    }
}

impl Debug for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HostHandle")
    }
}

impl PartialEq for HostHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
