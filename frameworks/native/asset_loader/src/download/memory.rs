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

//! In-process transport serving registered byte payloads.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use asset_core::AssetError;
use asset_utils::debug;

use super::common::{FetchRequest, FetchResponse, Transport};

const CHUNK_SIZE: usize = 16 * 1024;

/// Entry of the fetch journal kept by [`MemoryTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchEvent {
    Started(String),
    Aborted(String),
}

struct Route {
    outcome: Result<Vec<u8>, AssetError>,
    failures: VecDeque<AssetError>,
}

/// Transport answering from an in-memory route table.
///
/// Used for embedded assets and for driving loads deterministically: every
/// fetch is counted and journaled, an optional latency is applied before the
/// answer and a route can be told to fail its first attempts.
///
/// # Examples
///
/// ```rust
/// use asset_loader::{FetchRequest, MemoryTransport, Transport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = MemoryTransport::new();
/// transport.insert("mem://config.json", br#"{"volume": 3}"#.to_vec());
/// let response = transport
///     .fetch(&FetchRequest::new("mem://config.json"))
///     .await
///     .unwrap();
/// assert_eq!(200, response.status);
/// assert_eq!(1, transport.calls("mem://config.json"));
/// # }
/// ```
#[derive(Default)]
pub struct MemoryTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
    journal: Mutex<Vec<FetchEvent>>,
    latency: Mutex<Duration>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `bytes` for `uri`.
    pub fn insert(&self, uri: impl Into<String>, bytes: Vec<u8>) {
        self.set_route(uri.into(), Ok(bytes));
    }

    /// Answers every fetch of `uri` with `error`.
    pub fn insert_error(&self, uri: impl Into<String>, error: AssetError) {
        self.set_route(uri.into(), Err(error));
    }

    /// Makes the next `times` fetches of `uri` fail with `error` before the
    /// registered outcome is served.
    pub fn fail_first(&self, uri: &str, times: usize, error: AssetError) {
        let mut routes = self.routes.lock().unwrap();
        if let Some(route) = routes.get_mut(uri) {
            route.failures.extend(std::iter::repeat(error).take(times));
        }
    }

    /// Delays every answer by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self, uri: &str) -> usize {
        self.calls.lock().unwrap().get(uri).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Returns the fetch starts and aborts seen so far, in order.
    pub fn journal(&self) -> Vec<FetchEvent> {
        self.journal.lock().unwrap().clone()
    }

    fn set_route(&self, uri: String, outcome: Result<Vec<u8>, AssetError>) {
        self.routes.lock().unwrap().insert(
            uri,
            Route {
                outcome,
                failures: VecDeque::new(),
            },
        );
    }

    fn answer(&self, uri: &str) -> Result<Vec<u8>, AssetError> {
        let mut routes = self.routes.lock().unwrap();
        let route = match routes.get_mut(uri) {
            Some(route) => route,
            None => return Err(AssetError::transport(format!("{} not found", uri), Some(404))),
        };
        if let Some(err) = route.failures.pop_front() {
            return Err(err);
        }
        route.outcome.clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, AssetError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.uri.clone())
            .or_insert(0) += 1;
        self.journal
            .lock()
            .unwrap()
            .push(FetchEvent::Started(request.uri.clone()));

        let latency = *self.latency.lock().unwrap();
        let aborted = tokio::select! {
            _ = request.abort.cancelled() => true,
            _ = tokio::time::sleep(latency) => request.abort.is_aborted(),
        };
        if aborted {
            debug!("memory fetch {} aborted", request.uri);
            self.journal
                .lock()
                .unwrap()
                .push(FetchEvent::Aborted(request.uri.clone()));
            return Err(AssetError::cancelled());
        }

        let bytes = self.answer(&request.uri)?;
        let total = bytes.len() as u64;
        let mut loaded = 0;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            loaded += chunk.len() as u64;
            request.report(loaded, Some(total));
        }
        Ok(FetchResponse::ok(bytes))
    }
}
