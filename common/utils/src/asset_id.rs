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

//! Asset identifier utilities.
//!
//! This module provides the key type used to address assets across the cache,
//! the orchestrator and the scene pipeline, with helpers for deriving keys from
//! source URIs and for printing them compactly in logs.

use std::collections::hash_map::DefaultHasher;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Maximum number of characters printed by [`AssetId::brief`].
const BRIEF_LEN: usize = 16;

/// A unique identifier for assets.
///
/// Wraps the caller-chosen key of an asset. Two descriptors with the same
/// identifier refer to the same cached copy and share a single in-flight load.
///
/// # Examples
///
/// ```rust
/// use asset_utils::asset_id::AssetId;
///
/// let id = AssetId::new("textures/hero.png");
/// assert_eq!(id.as_str(), "textures/hero.png");
///
/// // Keys derived from the same URI are stable.
/// let a = AssetId::from_uri("https://cdn.example.com/hero.png");
/// let b = AssetId::from_uri("https://cdn.example.com/hero.png");
/// assert_eq!(a, b);
/// ```
#[derive(Hash, PartialEq, Eq, Clone, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId {
    /// The key that identifies the asset.
    key: String,
}

impl AssetId {
    /// Creates a new asset id from a caller-chosen key.
    ///
    /// # Parameters
    ///
    /// * `key` - The key to use as the asset identifier
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Creates a new asset id by hashing a source URI.
    ///
    /// # Parameters
    ///
    /// * `uri` - The URI string to hash
    ///
    /// # Returns
    ///
    /// A new `AssetId` whose key is the hex digest of the URI.
    pub fn from_uri(uri: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        uri.hash(&mut hasher);
        Self {
            key: format!("{:016x}", hasher.finish()),
        }
    }

    /// Returns the full key.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Returns a shortened version of the key for log lines.
    ///
    /// Keys longer than sixteen characters are cut at a character boundary.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use asset_utils::asset_id::AssetId;
    ///
    /// let id = AssetId::new("levels/forest/terrain_heightmap.png");
    /// assert_eq!(id.brief(), "levels/forest/te");
    /// ```
    pub fn brief(&self) -> &str {
        match self.key.char_indices().nth(BRIEF_LEN) {
            Some((idx, _)) => &self.key[..idx],
            None => &self.key,
        }
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl From<&str> for AssetId {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for AssetId {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}
