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

//! Loaded asset records and their state.
//!
//! This module defines the result side of a load: the per-id state machine,
//! the decoded payload variants and the record shared between the cache and
//! the orchestrator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AssetDescriptor, AssetKind};
use crate::dispose::{Disposable, HostHandle};

/// Position of an asset id in its load lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetState {
    /// Never requested, or unloaded since.
    Unrequested,
    /// A load is in flight.
    Loading,
    /// Loaded and available.
    Loaded,
    /// The last load settled with a terminal error.
    Failed,
    /// The last load was cancelled.
    Cancelled,
}

/// Decoded RGBA8 image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 pixels.
    pub pixels: Vec<u8>,
    /// Host-renderable handle created from the pixels, if any.
    #[serde(skip)]
    pub handle: Option<HostHandle>,
}

impl TextureData {
    /// Estimated memory footprint: four bytes per pixel.
    pub fn estimated_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * 4
    }
}

/// Decoded PCM audio with interleaved f32 samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioData {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
    /// Host playback buffer created from the samples, if any.
    #[serde(skip)]
    pub handle: Option<HostHandle>,
}

impl AudioData {
    /// Number of sample frames.
    pub fn frames(&self) -> u64 {
        match self.channels {
            0 => 0,
            channels => self.samples.len() as u64 / channels as u64,
        }
    }

    /// Estimated memory footprint: four bytes per sample per channel.
    pub fn estimated_size(&self) -> u64 {
        self.frames() * self.channels as u64 * 4
    }
}

/// Decoded payload of an asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Structured(Value),
    Texture(TextureData),
    Audio(AudioData),
    Binary(Vec<u8>),
}

impl Payload {
    /// Asset category the payload belongs to.
    pub fn kind(&self) -> AssetKind {
        match self {
            Payload::Structured(_) => AssetKind::StructuredData,
            Payload::Texture(_) => AssetKind::Texture,
            Payload::Audio(_) => AssetKind::Audio,
            Payload::Binary(_) => AssetKind::Other,
        }
    }
}

impl Disposable for Payload {
    fn dispose(&self) {
        match self {
            Payload::Texture(TextureData {
                handle: Some(handle),
                ..
            })
            | Payload::Audio(AudioData {
                handle: Some(handle),
                ..
            }) => handle.dispose(),
            _ => {}
        }
    }
}

/// Result record of a settled load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadedAsset {
    /// The request this record answers.
    pub descriptor: Arc<AssetDescriptor>,
    /// Decoded payload.
    pub payload: Payload,
    /// Bytes charged against cache budgets.
    pub size_bytes: u64,
    pub state: AssetState,
    /// Milliseconds since the Unix epoch at which the load settled.
    pub loaded_at: u64,
    /// Fraction of the load completed, in `[0, 1]`.
    pub progress: f64,
}

impl LoadedAsset {
    /// Builds a fully loaded record.
    pub fn loaded(descriptor: Arc<AssetDescriptor>, payload: Payload, size_bytes: u64) -> Self {
        Self {
            descriptor,
            payload,
            size_bytes,
            state: AssetState::Loaded,
            loaded_at: asset_utils::time::now_millis(),
            progress: 1.0,
        }
    }

    /// Asset category of the record.
    pub fn kind(&self) -> AssetKind {
        self.descriptor.kind
    }
}
