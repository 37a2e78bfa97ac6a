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

//! Core data model for asset acquisition and caching.
//!
//! This crate defines the types shared by the cache, the loaders and the
//! orchestrator: asset descriptors and their load options, loaded asset
//! records and payloads, the dispose capability, the host telemetry boundary
//! and the error taxonomy.

#![allow(missing_docs, clippy::new_without_default)]

pub mod config;
pub mod dispose;
pub mod error;
pub mod info;
pub mod telemetry;

pub use asset_utils::asset_id::AssetId;
pub use config::{AssetDescriptor, AssetKind, AssetSource, LoadOptions, Priority, Quality};
pub use dispose::{Disposable, HostHandle};
pub use error::{AssetError, ErrorKind};
pub use info::{AssetState, AudioData, LoadedAsset, Payload, TextureData};
pub use telemetry::HostTelemetry;
