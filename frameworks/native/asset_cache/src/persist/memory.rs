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

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use asset_core::AssetError;

use super::{DurableRecord, DurableStore};

/// Durable store kept in process memory.
///
/// Used when persistence across sessions is not needed and in tests.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, DurableRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn put(&self, key: &str, record: &DurableRecord) -> Result<(), AssetError> {
        self.records
            .lock()
            .unwrap()
            .insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, AssetError> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, AssetError> {
        Ok(self.records.lock().unwrap().remove(key).is_some())
    }

    async fn clear(&self) -> Result<(), AssetError> {
        self.records.lock().unwrap().clear();
        Ok(())
    }

    async fn scan(
        &self,
        visitor: &mut (dyn for<'r> FnMut(&'r DurableRecord) -> bool + Send),
    ) -> Result<(), AssetError> {
        let mut snapshot: Vec<DurableRecord> =
            self.records.lock().unwrap().values().cloned().collect();
        snapshot.sort_by(|a, b| a.accessed_at.cmp(&b.accessed_at).then(a.key.cmp(&b.key)));
        for record in snapshot.iter() {
            if !visitor(record) {
                break;
            }
        }
        Ok(())
    }
}
