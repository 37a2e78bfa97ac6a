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

//! Structured-data loader.

use std::sync::Arc;

use async_trait::async_trait;
use asset_core::{AssetDescriptor, AssetError, AssetKind, LoadedAsset, Payload};
use asset_utils::debug;
use serde_json::Value;

use super::schema;
use super::{fetch_bytes, AssetLoader, LoadContext};

/// Loads JSON documents, optionally in a lenient dialect and checked
/// against a schema.
#[derive(Default)]
pub struct StructuredLoader;

impl StructuredLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AssetLoader for StructuredLoader {
    fn name(&self) -> &str {
        "structured"
    }

    fn can_load(&self, kind: AssetKind) -> bool {
        kind == AssetKind::StructuredData
    }

    async fn load(
        &self,
        descriptor: &Arc<AssetDescriptor>,
        ctx: &LoadContext,
    ) -> Result<LoadedAsset, AssetError> {
        let bytes = fetch_bytes(descriptor, descriptor.resolve_source(), ctx).await?;
        let size = bytes.len() as u64;
        let value = parse(&bytes, descriptor.options.lenient)?;
        if let Some(schema) = descriptor.options.schema.as_ref() {
            let violations = schema::validate(&value, schema);
            if !violations.is_empty() {
                debug!("{} failed schema checks", descriptor.id.brief());
                return Err(AssetError::schema(violations));
            }
        }
        Ok(LoadedAsset::loaded(
            descriptor.clone(),
            Payload::Structured(value),
            size,
        ))
    }
}

/// Parses a JSON document.
///
/// The lenient dialect additionally accepts `//` and `/* */` comments and
/// trailing commas before `}` or `]`.
pub(crate) fn parse(bytes: &[u8], lenient: bool) -> Result<Value, AssetError> {
    if !lenient {
        return Ok(serde_json::from_slice(bytes)?);
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AssetError::validation(format!("document is not utf-8: {}", e)))?;
    let cleaned = strip_trailing_commas(&strip_comments(text));
    Ok(serde_json::from_str(&cleaned)?)
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                while chars.next_if(|&n| n != '\n').is_some() {}
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            let closes = chars[i + 1..]
                .iter()
                .find(|n| !n.is_whitespace())
                .is_some_and(|&n| n == '}' || n == ']');
            if !closes {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}
