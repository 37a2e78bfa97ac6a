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

//! SQLite-backed durable store.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use asset_core::AssetError;
use asset_utils::{error, info};
use rusqlite::{params, Connection, OptionalExtension};

use super::{DurableRecord, DurableStore};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS assets (\
    key TEXT PRIMARY KEY, \
    accessed_at INTEGER NOT NULL, \
    record BLOB NOT NULL)";

/// Durable store kept in one SQLite table.
///
/// Each row holds a bincode-encoded [`DurableRecord`]. The access timestamp
/// is mirrored into its own column so scans come back oldest first.
pub struct SqliteStore {
    inner: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let conn = Connection::open(path.as_ref()).map_err(storage_error)?;
        info!("open durable store {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    /// Opens a database that lives only as long as the store.
    pub fn open_in_memory() -> Result<Self, AssetError> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AssetError> {
        conn.execute(CREATE_TABLE, ()).map_err(storage_error)?;
        Ok(Self {
            inner: Mutex::new(conn),
        })
    }
}

fn storage_error(e: impl std::fmt::Display) -> AssetError {
    error!("durable store failed: {}", e);
    AssetError::storage(e)
}

fn encode(record: &DurableRecord) -> Result<Vec<u8>, AssetError> {
    bincode::serde::encode_to_vec(record, bincode::config::standard()).map_err(storage_error)
}

fn decode(bytes: &[u8]) -> Result<DurableRecord, AssetError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(record, _)| record)
        .map_err(storage_error)
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn put(&self, key: &str, record: &DurableRecord) -> Result<(), AssetError> {
        let bytes = encode(record)?;
        let conn = self.inner.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO assets (key, accessed_at, record) VALUES (?1, ?2, ?3)",
            params![key, record.accessed_at as i64, bytes],
        )
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, AssetError> {
        let conn = self.inner.lock().unwrap();
        let bytes: Option<Vec<u8>> = conn
            .query_row(
                "SELECT record FROM assets WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        match decode(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(_) => {
                // Rows from an older record layout read as absent.
                conn.execute("DELETE FROM assets WHERE key = ?1", params![key])
                    .map_err(storage_error)?;
                Ok(None)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, AssetError> {
        let conn = self.inner.lock().unwrap();
        let removed = conn
            .execute("DELETE FROM assets WHERE key = ?1", params![key])
            .map_err(storage_error)?;
        Ok(removed != 0)
    }

    async fn clear(&self) -> Result<(), AssetError> {
        let conn = self.inner.lock().unwrap();
        conn.execute("DELETE FROM assets", ()).map_err(storage_error)?;
        Ok(())
    }

    async fn scan(
        &self,
        visitor: &mut (dyn for<'r> FnMut(&'r DurableRecord) -> bool + Send),
    ) -> Result<(), AssetError> {
        let conn = self.inner.lock().unwrap();
        let mut unreadable = Vec::new();
        {
            let mut stmt = conn
                .prepare("SELECT key, record FROM assets ORDER BY accessed_at ASC, key ASC")
                .map_err(storage_error)?;
            let mut rows = stmt.query(()).map_err(storage_error)?;
            while let Some(row) = rows.next().map_err(storage_error)? {
                let key: String = row.get(0).map_err(storage_error)?;
                let bytes: Vec<u8> = row.get(1).map_err(storage_error)?;
                let Ok(record) = decode(&bytes) else {
                    unreadable.push(key);
                    continue;
                };
                if !visitor(&record) {
                    break;
                }
            }
        }
        for key in unreadable.iter() {
            conn.execute("DELETE FROM assets WHERE key = ?1", params![key])
                .map_err(storage_error)?;
        }
        if !unreadable.is_empty() {
            info!("dropped {} unreadable durable records", unreadable.len());
        }
        Ok(())
    }
}
