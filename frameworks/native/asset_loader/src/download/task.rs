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

//! In-flight load bookkeeping.
//!
//! A [`LoadTask`] is the single in-flight entry for one asset id. Every caller
//! that asks for the asset while it is loading attaches a waiter to the task
//! handle and receives the same outcome once the task completes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use asset_core::{AssetError, AssetId, AssetState, LoadedAsset};
use asset_utils::{debug, info};
use tokio::sync::oneshot;

use super::common::AbortSignal;
use super::{CANCEL, FAIL, INIT, RUNNING, SUCCESS};

pub(crate) type LoadResult = Result<Arc<LoadedAsset>, AssetError>;

pub(crate) type Waiter = oneshot::Sender<LoadResult>;

pub(crate) struct LoadTask {
    /// Sequence number distinguishing successive tasks for the same id.
    pub(crate) seq: usize,
    pub(crate) handle: TaskHandle,
}

impl LoadTask {
    pub(crate) fn new(id: AssetId, seq: usize, expected_size: u64) -> Self {
        info!("new load {} seq {}", id.brief(), seq);
        Self {
            seq,
            handle: TaskHandle::new(id, expected_size),
        }
    }
}

/// Shared control block of an in-flight load.
#[derive(Clone)]
pub(crate) struct TaskHandle {
    id: AssetId,
    state: Arc<AtomicUsize>,
    finish: Arc<AtomicBool>,
    abort: AbortSignal,
    waiters: Arc<Mutex<VecDeque<Waiter>>>,
    expected_size: u64,
}

impl TaskHandle {
    pub(crate) fn new(id: AssetId, expected_size: u64) -> Self {
        Self {
            id,
            state: Arc::new(AtomicUsize::new(INIT)),
            finish: Arc::new(AtomicBool::new(false)),
            abort: AbortSignal::new(),
            waiters: Arc::new(Mutex::new(VecDeque::with_capacity(1))),
            expected_size,
        }
    }

    pub(crate) fn id(&self) -> &AssetId {
        &self.id
    }

    pub(crate) fn is_finish(&self) -> bool {
        self.finish.load(Ordering::Acquire)
    }

    /// Position of the load in the per-id state machine. A finished task
    /// reports its outcome until it leaves the running map.
    pub(crate) fn state(&self) -> AssetState {
        match self.state.load(Ordering::Acquire) {
            SUCCESS => AssetState::Loaded,
            FAIL => AssetState::Failed,
            CANCEL => AssetState::Cancelled,
            _ => AssetState::Loading,
        }
    }

    pub(crate) fn set_running(&self) {
        self.state.store(RUNNING, Ordering::Release);
    }

    pub(crate) fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub(crate) fn expected_size(&self) -> u64 {
        self.expected_size
    }

    /// Attaches a waiter unless the task has already finished.
    ///
    /// # Returns
    /// `Err` hands the waiter back when the outcome has already been
    /// delivered; the caller must start over.
    pub(crate) fn try_add_waiter(&self, waiter: Waiter) -> Result<(), Waiter> {
        let mut waiters = self.waiters.lock().unwrap();
        if self.is_finish() {
            return Err(waiter);
        }
        debug!("add waiter to load {}", self.id.brief());
        waiters.push_back(waiter);
        Ok(())
    }

    /// Records the outcome and delivers it to every waiter.
    pub(crate) fn complete(&self, result: &LoadResult) {
        let state = match result {
            Ok(_) => SUCCESS,
            Err(e) if e.is_cancelled() => CANCEL,
            Err(_) => FAIL,
        };
        let mut waiters = self.waiters.lock().unwrap();
        self.state.store(state, Ordering::Release);
        self.finish.store(true, Ordering::Release);
        for waiter in waiters.drain(..) {
            // A dropped receiver only means the caller stopped waiting.
            let _ = waiter.send(result.clone());
        }
    }

    /// Fires the abort signal of a load that has not finished.
    ///
    /// # Returns
    /// `false` if the task had already finished or was already aborted.
    pub(crate) fn cancel(&self) -> bool {
        let _waiters = self.waiters.lock().unwrap();
        if self.is_finish() {
            return false;
        }
        info!("cancel load {}", self.id.brief());
        self.abort.abort()
    }
}
