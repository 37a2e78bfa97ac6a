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

//! Host telemetry sources.

use std::sync::Mutex;

use asset_core::HostTelemetry;
use sysinfo::System;

/// Reads parallelism and memory usage from the running system.
pub struct SystemTelemetry {
    system: Mutex<System>,
}

impl SystemTelemetry {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTelemetry for SystemTelemetry {
    fn parallelism(&self) -> Option<usize> {
        Some(num_cpus::get())
    }

    /// Used over total physical memory, refreshed on every call.
    fn heap_usage_ratio(&self) -> Option<f64> {
        let mut system = self.system.lock().unwrap();
        system.refresh_memory();
        match system.total_memory() {
            0 => None,
            total => Some(system.used_memory() as f64 / total as f64),
        }
    }
}

/// Telemetry with fixed answers, for hosts that know their limits up front.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StaticTelemetry {
    pub parallelism: Option<usize>,
    pub heap_usage_ratio: Option<f64>,
}

impl StaticTelemetry {
    pub fn new(parallelism: Option<usize>, heap_usage_ratio: Option<f64>) -> Self {
        Self {
            parallelism,
            heap_usage_ratio,
        }
    }
}

impl HostTelemetry for StaticTelemetry {
    fn parallelism(&self) -> Option<usize> {
        self.parallelism
    }

    fn heap_usage_ratio(&self) -> Option<f64> {
        self.heap_usage_ratio
    }
}
