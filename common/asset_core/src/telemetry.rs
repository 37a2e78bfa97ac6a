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

//! Signals reported by the host process.

/// Optional host-reported signals consulted by the cache and the pipeline.
///
/// Every method has a fallback so a host can implement only what it knows.
pub trait HostTelemetry: Send + Sync {
    /// Parallel-execution capacity hint; callers default to 4 when `None`.
    fn parallelism(&self) -> Option<usize> {
        None
    }

    /// Heap usage as a ratio of the host limit; `None` when unknown.
    fn heap_usage_ratio(&self) -> Option<f64> {
        None
    }
}
