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

//! Error types for asset operations.
//!
//! This module defines the single error type surfaced to callers, together
//! with the classification used to decide between retrying and failing.

use std::fmt::{self, Display};
use std::io;
use std::time::Duration;

use asset_utils::asset_id::AssetId;

use crate::config::AssetKind;

/// Primary error type for asset operations.
///
/// Carries a human-readable message, the offending asset id once known, an
/// optional transport status code and, for validation failures, every
/// violation found.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetError {
    kind: ErrorKind,
    message: String,
    asset_id: Option<AssetId>,
    status: Option<u16>,
    violations: Vec<String>,
}

/// Categorizes the failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No loader accepts the requested asset type.
    UnsupportedType,
    /// The payload was fetched but failed shape or schema checks.
    Validation,
    /// Network, transfer or protocol failure.
    Transport,
    /// An attempt exceeded its time limit.
    Timeout,
    /// Eviction could not free enough space for an insert.
    Capacity,
    /// The request was cancelled.
    Cancelled,
    /// The durable tier failed.
    Storage,
    /// Local I/O failed.
    Io,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedType => "unsupported type",
            ErrorKind::Validation => "validation",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Storage => "storage",
            ErrorKind::Io => "io",
        }
    }
}

impl AssetError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            asset_id: None,
            status: None,
            violations: Vec::new(),
        }
    }

    /// No loader is registered for `kind`.
    pub fn unsupported(kind: AssetKind) -> Self {
        Self::new(
            ErrorKind::UnsupportedType,
            format!("no loader registered for {}", kind.as_str()),
        )
    }

    /// The payload is malformed.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// The payload failed schema checks; every violation is kept.
    pub fn schema(violations: Vec<String>) -> Self {
        let mut err = Self::new(
            ErrorKind::Validation,
            format!("{} schema violation(s): {}", violations.len(), violations.join("; ")),
        );
        err.violations = violations;
        err
    }

    /// The transfer failed, optionally with a status code.
    pub fn transport(message: impl Into<String>, status: Option<u16>) -> Self {
        let mut err = Self::new(ErrorKind::Transport, message);
        err.status = status;
        err
    }

    /// An attempt ran longer than `limit`.
    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("timed out after {}ms", limit.as_millis()),
        )
    }

    /// An insert of `required` bytes cannot fit in `budget` bytes.
    pub fn capacity(required: u64, budget: u64) -> Self {
        Self::new(
            ErrorKind::Capacity,
            format!("{} bytes cannot fit in a budget of {} bytes", required, budget),
        )
    }

    /// The request was cancelled.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "load cancelled")
    }

    /// The durable tier failed.
    pub fn storage(message: impl Display) -> Self {
        Self::new(ErrorKind::Storage, message.to_string())
    }

    /// Tags the error with the asset it belongs to.
    pub fn with_asset(mut self, id: AssetId) -> Self {
        self.asset_id = Some(id);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn asset_id(&self) -> Option<&AssetId> {
        self.asset_id.as_ref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Returns `true` for cancellations, which count as settled, not failed.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error", self.kind.as_str())?;
        if let Some(id) = &self.asset_id {
            write!(f, " for asset {}", id)?;
        }
        if let Some(status) = self.status {
            write!(f, " (status {})", status)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for AssetError {}

impl From<io::Error> for AssetError {
    fn from(err: io::Error) -> Self {
        AssetError::new(ErrorKind::Io, err.to_string())
    }
}

impl From<serde_json::Error> for AssetError {
    /// Syntax and data errors mean the bytes are bad; I/O errors stay I/O.
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Io => AssetError::new(ErrorKind::Io, err.to_string()),
            _ => AssetError::validation(err.to_string()),
        }
    }
}
