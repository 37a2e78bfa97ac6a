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

//! Backoff, retry and timeout helpers.
//!
//! Everything here is stateless: the retry state of an operation lives on
//! the stack of [`with_retry`] and is dropped once the operation settles.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use asset_core::{AssetError, ErrorKind};
use asset_utils::{debug, error, info};
use rand::Rng;

/// Upper bound of the random jitter, as a share of the unjittered delay.
const JITTER_RATIO: f64 = 0.1;

/// Characters after a `status` or `http` marker searched for a status code.
const STATUS_WINDOW: usize = 12;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10000);
const DEFAULT_MULTIPLIER: f64 = 2.0;
const DEFAULT_PATTERNS: [&str; 3] = ["not found", "forbidden", "unauthorized"];
const DEFAULT_STATUSES: [u16; 7] = [400, 401, 403, 404, 405, 410, 422];

/// Observer called before each backoff sleep with the upcoming attempt
/// number, the error that triggered it and the delay.
pub type RetryHook = Arc<dyn Fn(u32, &AssetError, Duration) + Send + Sync>;

/// Observer called once retries are exhausted, with the last error.
pub type ExhaustedHook = Arc<dyn Fn(&AssetError) + Send + Sync>;

/// Backoff and retryability settings.
#[derive(Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Case-insensitive message fragments that mark an error as permanent.
    pub non_retryable_patterns: Vec<String>,
    /// Status codes that mark an error as permanent.
    pub non_retryable_statuses: Vec<u16>,
    pub on_retry: Option<RetryHook>,
    pub on_exhausted: Option<ExhaustedHook>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_MULTIPLIER,
            non_retryable_patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            non_retryable_statuses: DEFAULT_STATUSES.to_vec(),
            on_retry: None,
            on_exhausted: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("non_retryable_patterns", &self.non_retryable_patterns)
            .field("non_retryable_statuses", &self.non_retryable_statuses)
            .finish_non_exhaustive()
    }
}

impl RetryConfig {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32, &AssetError, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn on_exhausted<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AssetError) + Send + Sync + 'static,
    {
        self.on_exhausted = Some(Arc::new(hook));
        self
    }
}

/// Computes the delay before retry number `attempt + 1`.
///
/// The delay grows as `initial_delay * multiplier^attempt`, gains up to 10%
/// random jitter and is capped at `max_delay`.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use asset_loader::retry::{calculate_backoff_delay, RetryConfig};
///
/// let config = RetryConfig::default();
/// let delay = calculate_backoff_delay(1, &config);
/// assert!(delay >= Duration::from_millis(2000));
/// assert!(delay <= Duration::from_millis(2200));
/// ```
pub fn calculate_backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let base = config.initial_delay.as_millis() as f64 * config.backoff_multiplier.powi(exponent);
    let jitter = base * JITTER_RATIO * rand::thread_rng().gen::<f64>();
    let max = config.max_delay.as_millis() as f64;
    Duration::from_millis((base + jitter).min(max) as u64)
}

/// Decides whether `error` is worth another attempt.
///
/// Only transport, timeout and I/O failures are retried, and only when
/// neither their status code, explicit or embedded in the message, nor
/// their message matches the permanent-failure lists of `config`.
pub fn is_retryable_error(error: &AssetError, config: &RetryConfig) -> bool {
    match error.kind() {
        ErrorKind::Transport | ErrorKind::Timeout | ErrorKind::Io => {}
        _ => return false,
    }
    let status = error.status().or_else(|| embedded_status(error.message()));
    if status.is_some_and(|code| config.non_retryable_statuses.contains(&code)) {
        return false;
    }
    let message = error.message().to_lowercase();
    !config
        .non_retryable_patterns
        .iter()
        .any(|pattern| message.contains(&pattern.to_lowercase()))
}

/// Finds a status code written after `status` or `http` in `message`.
fn embedded_status(message: &str) -> Option<u16> {
    let lower = message.to_ascii_lowercase();
    ["status", "http"].iter().find_map(|marker| {
        lower.match_indices(marker).find_map(|(at, _)| {
            let window: String = lower[at + marker.len()..].chars().take(STATUS_WINDOW).collect();
            window
                .split(|c: char| !c.is_ascii_digit())
                .find(|token| token.len() == 3)
                .and_then(|token| token.parse::<u16>().ok())
                .filter(|code| (100..600).contains(code))
        })
    })
}

/// Runs `operation` until it succeeds, fails permanently or runs out of
/// retries.
///
/// `operation` receives the zero-based attempt index. Retryable failures are
/// followed by a backoff sleep; permanent ones are returned at once. Once
/// `max_retries` retries have failed, `on_exhausted` is told and the last
/// error is returned. Hooks cannot change the outcome, even by panicking.
pub async fn with_retry<T, F, Fut>(mut operation: F, config: &RetryConfig) -> Result<T, AssetError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AssetError>>,
{
    let mut attempt = 0;
    loop {
        let e = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !is_retryable_error(&e, config) {
            debug!("permanent failure on attempt {}: {}", attempt, e);
            return Err(e);
        }
        if attempt >= config.max_retries {
            error!("retries exhausted after {} attempts: {}", attempt + 1, e);
            if let Some(hook) = config.on_exhausted.as_ref() {
                if panic::catch_unwind(AssertUnwindSafe(|| hook(&e))).is_err() {
                    error!("exhausted hook panicked");
                }
            }
            return Err(e);
        }
        let delay = calculate_backoff_delay(attempt, config);
        attempt += 1;
        info!("retry {} in {}ms: {}", attempt, delay.as_millis(), e);
        if let Some(hook) = config.on_retry.as_ref() {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(attempt, &e, delay))).is_err() {
                error!("retry hook panicked");
            }
        }
        tokio::time::sleep(delay).await;
    }
}

/// Races `operation` against a timer of `limit`.
///
/// # Errors
/// Returns a `Timeout` error when the timer wins. The timer is dropped on
/// every exit path.
pub async fn with_timeout<T, Fut>(operation: Fut, limit: Duration) -> Result<T, AssetError>
where
    Fut: Future<Output = Result<T, AssetError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(res) => res,
        Err(_) => Err(AssetError::timeout(limit)),
    }
}
