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

//! Transport boundary.
//!
//! This module defines the request and response types exchanged with a
//! transport, the transport trait itself and the abort signal threaded
//! through every transfer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use asset_core::AssetError;
use tokio::sync::Notify;

/// Receives `(loaded, total)` byte counts while a transfer runs.
pub type ProgressSink = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// One fetch of raw bytes.
#[derive(Clone)]
pub struct FetchRequest {
    pub uri: String,
    pub headers: Vec<(String, String)>,
    /// Per-attempt limit enforced by the caller; transports may use it too.
    pub timeout: Option<Duration>,
    pub abort: AbortSignal,
    pub progress: Option<ProgressSink>,
}

impl FetchRequest {
    /// Creates a request for `uri` with a fresh abort signal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use asset_loader::FetchRequest;
    ///
    /// let request = FetchRequest::new("file:///assets/level.json")
    ///     .headers(vec![("Accept".to_string(), "application/json".to_string())]);
    /// assert!(!request.abort.is_aborted());
    /// ```
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: Vec::new(),
            timeout: None,
            abort: AbortSignal::new(),
            progress: None,
        }
    }

    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn abort(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn progress(mut self, progress: ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Forwards a byte count to the progress sink, if any.
    pub fn report(&self, loaded: u64, total: Option<u64>) {
        if let Some(progress) = self.progress.as_ref() {
            progress(loaded, total);
        }
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

/// Bytes returned by a transport.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchResponse {
    pub bytes: Vec<u8>,
    pub status: u16,
    pub content_type: Option<String>,
}

impl FetchResponse {
    pub fn ok(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            status: 200,
            content_type: None,
        }
    }
}

/// Fetches raw bytes from a URI.
///
/// Implementations report progress through [`FetchRequest::report`] and stop
/// with a `Cancelled` error once the request's abort signal fires.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, AssetError>;
}

/// Cooperative cancellation flag shared by everything working on a request.
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Arc<AbortInner>,
}

#[derive(Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal and wakes every waiter.
    ///
    /// # Returns
    /// `true` if this call fired the signal, `false` if it had already fired.
    pub fn abort(&self) -> bool {
        if self.inner.aborted.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Resolves once the signal has fired.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AbortSignal").field(&self.is_aborted()).finish()
    }
}
