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

//! Aggregate reports returned by the orchestrator and the pipeline.
//!
//! These structures summarize a group of loads or the memory held by an
//! orchestrator. They are recomputed on demand and never persisted.

use std::time::Duration;

use asset_core::{AssetError, AssetId};

/// Settle progress of an in-flight batch.
///
/// A failed or cancelled item counts as settled, so `loaded_assets` reaches
/// `total_assets` once every item has an outcome.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchProgress {
    pub total_assets: usize,
    /// Items that settled, successfully or not.
    pub loaded_assets: usize,
    /// `loaded_assets / total_assets`, or `1.0` for an empty batch.
    pub progress: f64,
}

impl BatchProgress {
    /// Creates a progress snapshot.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use asset_loader::BatchProgress;
    ///
    /// assert_eq!(0.25, BatchProgress::new(4, 1).progress);
    /// assert_eq!(1.0, BatchProgress::new(0, 0).progress);
    /// ```
    pub fn new(total_assets: usize, loaded_assets: usize) -> Self {
        let progress = match total_assets {
            0 => 1.0,
            total => loaded_assets as f64 / total as f64,
        };
        Self {
            total_assets,
            loaded_assets,
            progress,
        }
    }

    pub fn is_done(&self) -> bool {
        self.loaded_assets >= self.total_assets
    }
}

/// Byte accounting of an orchestrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// `cached + active`.
    pub total: u64,
    /// Bytes held by the cache.
    pub cached: u64,
    /// Expected bytes of loads still in flight.
    pub active: u64,
    /// Byte budget of the cache.
    pub max: u64,
    pub item_count: usize,
}

impl MemoryUsage {
    /// Fraction of the cache budget in use.
    pub fn usage_ratio(&self) -> f64 {
        match self.max {
            0 => 0.0,
            max => self.cached as f64 / max as f64,
        }
    }
}

/// Outcome of one scene load.
#[derive(Clone, Debug, Default)]
pub struct SceneReport {
    pub scene: String,
    pub loaded: Vec<AssetId>,
    pub failed: Vec<(AssetId, AssetError)>,
    /// Items abandoned because a newer scene superseded this one.
    pub cancelled: Vec<AssetId>,
    pub elapsed: Duration,
}

impl SceneReport {
    pub(crate) fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            ..Default::default()
        }
    }

    /// Returns `true` if every asset of the scene loaded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Number of assets that reached an outcome.
    pub fn settled(&self) -> usize {
        self.loaded.len() + self.failed.len() + self.cancelled.len()
    }
}
