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

//! Asset loading library with deduplication, retries and scene pipelines.
//!
//! This library fetches assets through a pluggable transport, decodes them
//! with type-specific loaders, and caches the results. Two front ends are
//! provided: [`AssetManager`] for ad hoc and batch loads with per-id
//! deduplication under a global concurrency ceiling, and [`ScenePipeline`]
//! for priority-ordered bulk loads that are cancelled on scene switch.

#![allow(missing_docs, clippy::new_without_default)]

mod download;
mod info;
mod observe;
mod pipeline;
mod services;
mod telemetry;

pub mod loaders;
pub mod retry;

pub use download::common::{AbortSignal, FetchRequest, FetchResponse, ProgressSink, Transport};
pub use download::file::FileTransport;
pub use download::memory::{FetchEvent, MemoryTransport};
pub use info::{BatchProgress, MemoryUsage, SceneReport};
pub use observe::{AssetEvent, EventBus, EventHandler, SubscriptionId};
pub use pipeline::{PipelineConfig, ScenePipeline};
pub use retry::RetryConfig;
pub use services::{AssetManager, ManagerConfig};
pub use telemetry::{StaticTelemetry, SystemTelemetry};
