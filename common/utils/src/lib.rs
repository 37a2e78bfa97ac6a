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

//! Common utilities for asset operations.
//!
//! This crate provides the small building blocks shared by the asset crates:
//! asset identifiers, an access-ordered map used for recency tracking, clock
//! helpers and logging setup for tests.

#![warn(missing_docs)]
#![allow(missing_docs, clippy::new_without_default)]

/// Asset identifier generation and display utilities.
pub mod asset_id;

/// Access-ordered map used for Least Recently Used bookkeeping.
pub mod lru;

/// Wall clock helpers.
pub mod time;

pub use log::{debug, error, info, warn};
