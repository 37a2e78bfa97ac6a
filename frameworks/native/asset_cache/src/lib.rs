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

//! Asset cache library with pluggable eviction and a durable second tier.
//!
//! This library provides a byte- and item-bounded in-memory cache keyed by
//! asset id, with time-to-live expiry, memory-pressure signaling and a
//! periodic sweep, plus a two-level cache that persists entries across
//! sessions through a durable key-value store.

#![allow(missing_docs, clippy::new_without_default)]

mod config;
mod data;
mod dispose;
mod manage;
mod observe;
mod stats;

pub mod persist;

pub use config::{CacheConfig, EvictionPolicy};
pub use dispose::{Disposer, DisposerRegistry};
pub use manage::AssetCache;
pub use observe::MemoryPressure;
pub use persist::{DurableRecord, DurableStore, MemoryStore, SqliteStore, TieredCache, TieredConfig, TieredStats};
pub use stats::CacheStats;
