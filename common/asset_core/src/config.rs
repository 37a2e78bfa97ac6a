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

//! Request-side types for assets.
//!
//! This module describes what a caller asks for: the asset category, where
//! its bytes live (with optional quality tiers and an uncompressed fallback)
//! and the per-request options that steer fetching, decoding and caching.

use std::collections::BTreeMap;
use std::time::Duration;

use asset_utils::asset_id::AssetId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of an asset, used to pick a loader and a disposer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// JSON-like structured data.
    StructuredData,
    /// Images, textures and sprites.
    Texture,
    /// Audio clips.
    Audio,
    /// Anything else, delivered as raw bytes.
    Other,
}

impl AssetKind {
    /// Returns a short lowercase name for log lines and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::StructuredData => "structured-data",
            AssetKind::Texture => "texture",
            AssetKind::Audio => "audio",
            AssetKind::Other => "other",
        }
    }
}

/// Quality tier of a source variant, ordered from lowest to highest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    Low,
    Medium,
    High,
    Premium,
}

/// Dispatch tier used by the scene pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Sort weight of the tier; lower values are dispatched first.
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

/// Where the bytes of an asset can be fetched from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetSource {
    /// Source used when no variant matches.
    pub primary: String,
    /// Optional quality-tiered variants of the primary source.
    pub variants: BTreeMap<Quality, String>,
    /// Uncompressed source tried when the primary fails to decode.
    pub fallback: Option<String>,
}

impl AssetSource {
    /// Creates a source with only a primary URI.
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            variants: BTreeMap::new(),
            fallback: None,
        }
    }

    /// Picks the URI to fetch for a requested quality.
    ///
    /// The requested tier wins when present, then the next lower tiers in
    /// order, and finally the primary source.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use asset_core::{AssetSource, Quality};
    ///
    /// let mut source = AssetSource::new("hero.png");
    /// source.variants.insert(Quality::Low, "hero_low.png".into());
    /// assert_eq!(source.resolve(Some(Quality::High)), "hero_low.png");
    /// assert_eq!(source.resolve(None), "hero.png");
    /// ```
    pub fn resolve(&self, quality: Option<Quality>) -> &str {
        let Some(quality) = quality else {
            return &self.primary;
        };
        self.variants
            .range(..=quality)
            .next_back()
            .map(|(_, uri)| uri.as_str())
            .unwrap_or(&self.primary)
    }
}

/// Type-specific options attached to a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Per-attempt timeout; the orchestrator default applies when unset.
    pub timeout: Option<Duration>,
    /// Retries after the first attempt; the orchestrator default applies when unset.
    pub max_retries: Option<u32>,
    /// Extra request headers handed to the transport.
    pub headers: Vec<(String, String)>,
    /// Schema checked against structured data after parsing.
    pub schema: Option<Value>,
    /// Strip comments and trailing commas before parsing structured data.
    pub lenient: bool,
    /// Preferred quality tier.
    pub quality: Option<Quality>,
    /// Container format of the primary source, for example `"png"`.
    pub compression: Option<String>,
    /// Whether the result is written to the cache.
    pub cache: bool,
    /// Time to live of the cached copy.
    pub ttl: Option<Duration>,
    /// Dispatch tier inside the scene pipeline.
    pub priority: Priority,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_retries: None,
            headers: Vec::new(),
            schema: None,
            lenient: false,
            quality: None,
            compression: None,
            cache: true,
            ttl: None,
            priority: Priority::Normal,
        }
    }
}

/// Immutable description of one asset request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Unique key of the asset.
    pub id: AssetId,
    /// Asset category.
    pub kind: AssetKind,
    /// Where to fetch the bytes from.
    pub source: AssetSource,
    /// Type-specific options.
    pub options: LoadOptions,
    /// Size hint in bytes.
    pub expected_size: Option<u64>,
}

impl AssetDescriptor {
    /// Creates a descriptor with default options.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use asset_core::{AssetDescriptor, AssetKind, Priority};
    ///
    /// let desc = AssetDescriptor::new("hero", AssetKind::Texture, "hero.ktx2")
    ///     .fallback("hero.png")
    ///     .priority(Priority::Critical);
    /// assert_eq!(desc.source.fallback.as_deref(), Some("hero.png"));
    /// ```
    pub fn new(id: impl Into<AssetId>, kind: AssetKind, primary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: AssetSource::new(primary),
            options: LoadOptions::default(),
            expected_size: None,
        }
    }

    /// Adds a quality-tiered variant of the source.
    pub fn variant(mut self, quality: Quality, uri: impl Into<String>) -> Self {
        self.source.variants.insert(quality, uri.into());
        self
    }

    /// Sets the uncompressed fallback source.
    pub fn fallback(mut self, uri: impl Into<String>) -> Self {
        self.source.fallback = Some(uri.into());
        self
    }

    /// Replaces the load options.
    pub fn options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the pipeline priority tier.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    /// Sets the size hint.
    pub fn expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Returns the URI the loaders fetch first.
    pub fn resolve_source(&self) -> &str {
        self.source.resolve(self.options.quality)
    }
}
