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

//! Throttled progress reporting for in-flight loads.

use std::sync::{Arc, Mutex};

use asset_core::AssetId;

use super::common::ProgressSink;
use crate::observe::{AssetEvent, EventBus};

/// Only one progress report in every PROGRESS_INTERVAL reaches the bus.
const PROGRESS_INTERVAL: usize = 8;

struct ProgressRestriction {
    processed: u64,
    count: usize,
}

/// Forwards transport byte counts to the bus as `asset:progress` events.
///
/// Repeated byte counts and the final count are dropped; the terminal event
/// of the load stands for completion.
pub(crate) struct ProgressReporter {
    id: AssetId,
    bus: EventBus,
    restriction: Mutex<ProgressRestriction>,
}

impl ProgressReporter {
    pub(crate) fn new(id: AssetId, bus: EventBus) -> Self {
        Self {
            id,
            bus,
            restriction: Mutex::new(ProgressRestriction {
                processed: 0,
                count: 0,
            }),
        }
    }

    pub(crate) fn report(&self, loaded: u64, total: Option<u64>) {
        {
            let mut restriction = self.restriction.lock().unwrap();
            if loaded == restriction.processed || Some(loaded) == total {
                return;
            }
            restriction.processed = loaded;
            let count = restriction.count;
            restriction.count += 1;
            if count % PROGRESS_INTERVAL != 0 {
                return;
            }
            restriction.count = 1;
        }
        self.bus.emit(&AssetEvent::AssetProgress {
            id: self.id.clone(),
            loaded,
            total,
        });
    }

    pub(crate) fn sink(self: Arc<Self>) -> ProgressSink {
        Arc::new(move |loaded, total| self.report(loaded, total))
    }
}
