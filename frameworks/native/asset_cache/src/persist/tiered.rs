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

//! Two-level cache: in-memory L1 over a durable L2.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use asset_core::{AssetDescriptor, AssetError, AudioData, LoadedAsset, Payload, TextureData};
use asset_utils::asset_id::AssetId;
use asset_utils::time::now_millis;
use asset_utils::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{DurableRecord, DurableStore};
use crate::manage::AssetCache;
use crate::stats::CacheStats;

const DEFAULT_MAX_PAYLOAD: u64 = 5 * 1024 * 1024;
const DEFAULT_MAX_DURABLE: u64 = 200 * 1024 * 1024;
const DEFAULT_DURABLE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Behavior of the durable tier.
#[derive(Clone, Debug)]
pub struct TieredConfig {
    /// When `false` the tiered cache behaves like its L1 alone.
    pub persist: bool,
    /// Cache format version; records written with another version are purged.
    pub version: String,
    /// Assets larger than this are persisted as metadata only.
    pub max_payload_bytes: u64,
    /// Byte quota of the durable tier, enforced oldest access first.
    pub max_durable_bytes: u64,
    /// Time to live of records whose asset has none.
    pub default_ttl: Option<Duration>,
}

impl Default for TieredConfig {
    fn default() -> Self {
        Self {
            persist: true,
            version: "1".to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD,
            max_durable_bytes: DEFAULT_MAX_DURABLE,
            default_ttl: Some(DEFAULT_DURABLE_TTL),
        }
    }
}

impl TieredConfig {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn max_payload_bytes(mut self, size: u64) -> Self {
        self.max_payload_bytes = size;
        self
    }

    pub fn max_durable_bytes(mut self, size: u64) -> Self {
        self.max_durable_bytes = size;
        self
    }
}

/// Merged statistics of both tiers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TieredStats {
    pub l1: CacheStats,
    pub l2_hits: u64,
    pub l2_misses: u64,
    /// Average of the per-tier hit rates over tiers that saw requests.
    pub hit_rate: f64,
    /// Average of the per-tier miss rates over tiers that saw requests.
    pub miss_rate: f64,
}

#[derive(Default)]
struct TierCounters {
    hits: u64,
    misses: u64,
}

/// Read-through, write-through cache over an [`AssetCache`] and a
/// [`DurableStore`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use asset_cache::{AssetCache, CacheConfig, SqliteStore, TieredCache, TieredConfig};
///
/// # async fn demo() -> Result<(), asset_core::AssetError> {
/// let l1 = Arc::new(AssetCache::new(CacheConfig::default()));
/// let l2 = Arc::new(SqliteStore::open("assets.db")?);
/// let cache = TieredCache::new(l1, l2, TieredConfig::default().version("2"));
/// let _ = cache.get(&"hero".into()).await?;
/// # Ok(())
/// # }
/// ```
pub struct TieredCache {
    l1: Arc<AssetCache>,
    l2: Arc<dyn DurableStore>,
    config: TieredConfig,
    counters: Mutex<TierCounters>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TieredCache {
    pub fn new(l1: Arc<AssetCache>, l2: Arc<dyn DurableStore>, config: TieredConfig) -> Self {
        Self {
            l1,
            l2,
            config,
            counters: Mutex::new(TierCounters::default()),
            sweeper: Mutex::new(None),
        }
    }

    pub fn l1(&self) -> &Arc<AssetCache> {
        &self.l1
    }

    pub fn config(&self) -> &TieredConfig {
        &self.config
    }

    /// Writes `asset` to L1 and, when persistence is on, to L2.
    ///
    /// The durable write happens even if L1 rejects the asset; the L1 error
    /// is returned afterwards.
    pub async fn set(&self, id: AssetId, asset: Arc<LoadedAsset>) -> Result<(), AssetError> {
        let l1_res = self.l1.set(id.clone(), asset.clone());
        if self.config.persist {
            let now = now_millis();
            let body = if asset.size_bytes > self.config.max_payload_bytes {
                debug!("{} persisted as metadata only", id.brief());
                None
            } else {
                Some(encode_body(&asset)?)
            };
            let ttl = asset.descriptor.options.ttl.or(self.config.default_ttl);
            let record = DurableRecord {
                key: id.as_str().to_string(),
                kind: asset.kind(),
                body,
                size_bytes: asset.size_bytes,
                stored_at: now,
                accessed_at: now,
                ttl_ms: ttl.map(|ttl| ttl.as_millis() as u64),
                version: self.config.version.clone(),
            };
            self.l2.put(id.as_str(), &record).await?;
            if let Err(e) = self.enforce_quota().await {
                error!("durable quota pass failed: {}", e);
            }
        }
        l1_res
    }

    /// Reads `id` from L1, then from L2.
    ///
    /// An L2 hit is copied back into L1. Expired, version-mismatched and
    /// unreadable records are purged and reported as misses, and so are
    /// metadata-only records since their payload must be fetched again.
    pub async fn get(&self, id: &AssetId) -> Result<Option<Arc<LoadedAsset>>, AssetError> {
        if let Some(asset) = self.l1.get(id) {
            return Ok(Some(asset));
        }
        if !self.config.persist {
            return Ok(None);
        }
        let Some(mut record) = self.l2.get(id.as_str()).await? else {
            self.count(false);
            return Ok(None);
        };
        let now = now_millis();
        if !self.is_valid(&record, now) {
            info!("purge stale durable record {}", id.brief());
            self.l2.delete(id.as_str()).await?;
            self.count(false);
            return Ok(None);
        }
        let Some(body) = record.body.as_ref() else {
            debug!("{} has metadata only", id.brief());
            self.count(false);
            return Ok(None);
        };
        let asset = match decode_body(body) {
            Ok(asset) => asset,
            Err(e) => {
                error!("durable record {} unreadable: {}", id.brief(), e);
                self.l2.delete(id.as_str()).await?;
                self.count(false);
                return Ok(None);
            }
        };
        let asset = Arc::new(asset);
        let remaining = record
            .expires_at()
            .map(|at| Duration::from_millis(at.saturating_sub(now)));
        if let Err(e) = self.l1.set_with_ttl(id.clone(), asset.clone(), remaining) {
            error!("repopulate {} failed: {}", id.brief(), e);
        }
        record.accessed_at = now;
        self.l2.put(id.as_str(), &record).await?;
        self.count(true);
        Ok(Some(asset))
    }

    /// Checks either tier for `id`. Metadata-only records count as present.
    pub async fn has(&self, id: &AssetId) -> Result<bool, AssetError> {
        if self.l1.has(id) {
            return Ok(true);
        }
        if !self.config.persist {
            return Ok(false);
        }
        Ok(self
            .l2
            .get(id.as_str())
            .await?
            .is_some_and(|record| self.is_valid(&record, now_millis())))
    }

    /// Removes `id` from both tiers.
    pub async fn delete(&self, id: &AssetId) -> Result<bool, AssetError> {
        let in_l1 = self.l1.delete(id);
        let in_l2 = if self.config.persist {
            self.l2.delete(id.as_str()).await?
        } else {
            false
        };
        Ok(in_l1 || in_l2)
    }

    /// Empties both tiers.
    pub async fn clear(&self) -> Result<(), AssetError> {
        self.l1.clear();
        if self.config.persist {
            self.l2.clear().await?;
        }
        Ok(())
    }

    /// Purges expired and version-mismatched durable records.
    ///
    /// # Returns
    /// The number of purged records.
    pub async fn sweep_durable(&self) -> Result<usize, AssetError> {
        let now = now_millis();
        let mut stale = Vec::new();
        self.l2
            .scan(&mut |record: &DurableRecord| {
                if !self.is_valid(record, now) {
                    stale.push(record.key.clone());
                }
                true
            })
            .await?;
        for key in stale.iter() {
            self.l2.delete(key).await?;
        }
        if !stale.is_empty() {
            info!("durable sweep purged {} records", stale.len());
        }
        Ok(stale.len())
    }

    /// Deletes the least recently accessed durable records until the tier
    /// fits its byte quota.
    ///
    /// # Returns
    /// The number of deleted records.
    pub async fn enforce_quota(&self) -> Result<usize, AssetError> {
        let mut records = Vec::new();
        let mut total = 0u64;
        self.l2
            .scan(&mut |record: &DurableRecord| {
                total += record.stored_bytes();
                records.push((record.key.clone(), record.stored_bytes()));
                true
            })
            .await?;
        let mut deleted = 0;
        for (key, bytes) in records {
            if total <= self.config.max_durable_bytes {
                break;
            }
            self.l2.delete(&key).await?;
            total -= bytes;
            deleted += 1;
        }
        if deleted != 0 {
            info!("durable quota evicted {} records", deleted);
        }
        Ok(deleted)
    }

    pub fn stats(&self) -> TieredStats {
        let l1 = self.l1.stats();
        let counters = self.counters.lock().unwrap();
        let l2_total = counters.hits + counters.misses;
        let mut rates = Vec::with_capacity(2);
        if l1.total_requests != 0 {
            rates.push((l1.hit_rate(), l1.miss_rate()));
        }
        if l2_total != 0 {
            rates.push((
                counters.hits as f64 / l2_total as f64,
                counters.misses as f64 / l2_total as f64,
            ));
        }
        let (hit_rate, miss_rate) = match rates.len() {
            0 => (0.0, 0.0),
            n => {
                let (h, m) = rates
                    .iter()
                    .fold((0.0, 0.0), |(h, m), (rh, rm)| (h + rh, m + rm));
                (h / n as f64, m / n as f64)
            }
        };
        TieredStats {
            l1,
            l2_hits: counters.hits,
            l2_misses: counters.misses,
            hit_rate,
            miss_rate,
        }
    }

    /// Starts the L1 sweep and a durable sweep on the same period.
    pub fn start(self: &Arc<Self>) {
        self.l1.start();
        if !self.config.persist {
            return;
        }
        let mut sweeper = self.sweeper.lock().unwrap();
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let period = self.l1.config().sweep_interval();
        let weak = Arc::downgrade(self);
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = cache.sweep_durable().await {
                    error!("durable sweep failed: {}", e);
                }
            }
        }));
    }

    /// Stops both sweeps.
    pub fn stop(&self) {
        self.l1.stop();
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn is_valid(&self, record: &DurableRecord, now_ms: u64) -> bool {
        record.version == self.config.version && !record.is_expired(now_ms)
    }

    fn count(&self, hit: bool) {
        let mut counters = self.counters.lock().unwrap();
        if hit {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
    }
}

/// Durable form of a [`LoadedAsset`].
///
/// Media payloads keep their raw buffers; structured payloads and the
/// descriptor, whose schema is free-form, are stored as JSON text.
#[derive(Serialize, Deserialize)]
struct StoredAsset {
    descriptor: Vec<u8>,
    payload: StoredPayload,
    size_bytes: u64,
    loaded_at: u64,
}

#[derive(Serialize, Deserialize)]
enum StoredPayload {
    Structured(Vec<u8>),
    Texture(TextureData),
    Audio(AudioData),
    Binary(Vec<u8>),
}

fn encode_body(asset: &LoadedAsset) -> Result<Vec<u8>, AssetError> {
    let payload = match &asset.payload {
        Payload::Structured(value) => StoredPayload::Structured(serde_json::to_vec(value)?),
        Payload::Texture(texture) => StoredPayload::Texture(texture.clone()),
        Payload::Audio(audio) => StoredPayload::Audio(audio.clone()),
        Payload::Binary(bytes) => StoredPayload::Binary(bytes.clone()),
    };
    let stored = StoredAsset {
        descriptor: serde_json::to_vec(asset.descriptor.as_ref())?,
        payload,
        size_bytes: asset.size_bytes,
        loaded_at: asset.loaded_at,
    };
    bincode::serde::encode_to_vec(&stored, bincode::config::standard()).map_err(AssetError::storage)
}

fn decode_body(body: &[u8]) -> Result<LoadedAsset, AssetError> {
    let (stored, _): (StoredAsset, usize) =
        bincode::serde::decode_from_slice(body, bincode::config::standard())
            .map_err(AssetError::storage)?;
    let descriptor: AssetDescriptor = serde_json::from_slice(&stored.descriptor)?;
    let payload = match stored.payload {
        StoredPayload::Structured(text) => Payload::Structured(serde_json::from_slice(&text)?),
        StoredPayload::Texture(texture) => Payload::Texture(texture),
        StoredPayload::Audio(audio) => Payload::Audio(audio),
        StoredPayload::Binary(bytes) => Payload::Binary(bytes),
    };
    let mut asset = LoadedAsset::loaded(Arc::new(descriptor), payload, stored.size_bytes);
    asset.loaded_at = stored.loaded_at;
    Ok(asset)
}

impl Drop for TieredCache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().ok().and_then(|s| s.take()) {
            handle.abort();
        }
    }
}
