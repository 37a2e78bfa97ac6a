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

//! Byte budget accounting for a cache instance.

/// Tracks the total byte budget and the bytes currently charged against it.
pub(crate) struct ByteBudget {
    pub(super) total_capacity: u64,
    pub(super) used_capacity: u64,
}

impl ByteBudget {
    pub(crate) fn new(capacity: u64) -> Self {
        Self {
            total_capacity: capacity,
            used_capacity: 0,
        }
    }

    /// Charges `apply_size` bytes if they fit.
    ///
    /// # Returns
    /// `true` if the bytes were charged, `false` if the budget is exhausted.
    pub(crate) fn apply_cache_size(&mut self, apply_size: u64) -> bool {
        if apply_size + self.used_capacity > self.total_capacity {
            return false;
        }
        self.used_capacity += apply_size;
        true
    }

    /// Returns `size` bytes to the budget.
    pub(crate) fn release(&mut self, size: u64) {
        self.used_capacity = self.used_capacity.saturating_sub(size);
    }

    /// Returns every charged byte to the budget.
    pub(crate) fn reset(&mut self) {
        self.used_capacity = 0;
    }

    pub(crate) fn available(&self) -> u64 {
        self.total_capacity.saturating_sub(self.used_capacity)
    }

    pub(crate) fn used(&self) -> u64 {
        self.used_capacity
    }

    pub(crate) fn total(&self) -> u64 {
        self.total_capacity
    }
}
