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

use super::ByteBudget;
const TEST_TOTAL_SIZE: u64 = 1024;

// @tc.name: ut_cache_space
// @tc.desc: Test ByteBudget apply and release operations
// @tc.precon: NA
// @tc.step: 1. Create ByteBudget with TEST_TOTAL_SIZE
//           2. Apply half of total size
//           3. Apply more than what is left
//           4. Release quarter of total size
// @tc.expect: used capacity updates correctly, oversized apply is refused
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level1
#[test]
fn ut_cache_space() {
    let mut budget = ByteBudget::new(TEST_TOTAL_SIZE);
    assert!(budget.apply_cache_size(TEST_TOTAL_SIZE / 2));
    assert_eq!(budget.used(), TEST_TOTAL_SIZE / 2);
    assert!(!budget.apply_cache_size(TEST_TOTAL_SIZE));
    assert_eq!(budget.used(), TEST_TOTAL_SIZE / 2);
    budget.release(TEST_TOTAL_SIZE / 4);
    assert_eq!(budget.used(), TEST_TOTAL_SIZE / 4);
    assert_eq!(budget.available(), TEST_TOTAL_SIZE * 3 / 4);
}

// @tc.name: ut_cache_space_release_saturates
// @tc.desc: Test that releasing more than used never underflows
// @tc.precon: NA
// @tc.step: 1. Apply 10 bytes
//           2. Release 20 bytes
//           3. Reset the budget
// @tc.expect: used capacity stays at 0
// @tc.type: FUNC
// @tc.require: issue#ICN31I
// @tc.level: level2
#[test]
fn ut_cache_space_release_saturates() {
    let mut budget = ByteBudget::new(TEST_TOTAL_SIZE);
    budget.apply_cache_size(10);
    budget.release(20);
    assert_eq!(budget.used(), 0);
    budget.apply_cache_size(10);
    budget.reset();
    assert_eq!(budget.used(), 0);
}
