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

//! Local file transport.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use asset_core::AssetError;
use asset_utils::{debug, error};
use tokio::io::AsyncReadExt;

use super::common::{FetchRequest, FetchResponse, Transport};

const CHUNK_SIZE: usize = 64 * 1024;
const FILE_SCHEME: &str = "file://";

/// Reads assets from the local file system.
///
/// Accepts `file://` URIs and plain paths. Relative paths resolve against the
/// configured root. Files are read in chunks; the abort signal is checked and
/// progress reported after each one.
#[derive(Clone, Debug, Default)]
pub struct FileTransport {
    root: Option<PathBuf>,
}

impl FileTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport resolving relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, uri: &str) -> PathBuf {
        let path = Path::new(uri.strip_prefix(FILE_SCHEME).unwrap_or(uri));
        match self.root.as_ref() {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn transport_error(e: io::Error, path: &Path) -> AssetError {
    match e.kind() {
        io::ErrorKind::NotFound => {
            AssetError::transport(format!("{} not found", path.display()), Some(404))
        }
        io::ErrorKind::PermissionDenied => {
            AssetError::transport(format!("{} forbidden", path.display()), Some(403))
        }
        _ => AssetError::transport(format!("read {} failed: {}", path.display(), e), None),
    }
}

fn content_type(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "wav" => "audio/wav",
        _ => return None,
    };
    Some(mime.to_string())
}

#[async_trait]
impl Transport for FileTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, AssetError> {
        let path = self.resolve(&request.uri);
        debug!("read file {}", path.display());
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| transport_error(e, &path))?;
        let total = file.metadata().await.ok().map(|meta| meta.len());
        let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            if request.abort.is_aborted() {
                debug!("read {} aborted", path.display());
                return Err(AssetError::cancelled());
            }
            let n = file
                .read(&mut chunk)
                .await
                .map_err(|e| transport_error(e, &path))?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);
            request.report(bytes.len() as u64, total);
        }
        if total.is_some_and(|total| total != bytes.len() as u64) {
            error!("{} changed while reading", path.display());
        }
        Ok(FetchResponse {
            bytes,
            status: 200,
            content_type: content_type(&path),
        })
    }
}
