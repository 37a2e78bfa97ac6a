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

//! Validation of structured data against a JSON-Schema subset.
//!
//! Supported keywords: `type` (a name or a list of names), `enum`,
//! `minimum`, `maximum`, `minLength`, `maxLength`, `required`, `properties`
//! and `items`. Unknown keywords are ignored.

use serde_json::{Map, Value};

const ROOT: &str = "$";

/// Checks `value` against `schema` and returns every violation found.
///
/// Each violation names the path of the offending value, such as
/// `items[2].name`; the document root is `$`.
///
/// # Examples
///
/// ```rust
/// use asset_loader::loaders::schema::validate;
/// use serde_json::json;
///
/// let schema = json!({"type": "object", "required": ["name"]});
/// assert_eq!(
///     validate(&json!({}), &schema),
///     vec!["$: missing required property name".to_string()]
/// );
/// assert!(validate(&json!({"name": "hero"}), &schema).is_empty());
/// ```
pub fn validate(value: &Value, schema: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    check(value, schema, ROOT, &mut violations);
    violations
}

fn check(value: &Value, schema: &Value, path: &str, out: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };
    if let Some(expected) = schema.get("type") {
        if !type_allowed(value, expected) {
            out.push(format!(
                "{}: expected {}, found {}",
                path,
                expected_names(expected),
                type_name(value)
            ));
            return;
        }
    }
    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            out.push(format!("{}: {} is not an allowed value", path, value));
        }
    }
    if let Some(n) = value.as_f64() {
        check_number(n, schema, path, out);
    }
    if let Some(s) = value.as_str() {
        check_length(s.chars().count(), schema, path, out);
    }
    if let Some(object) = value.as_object() {
        check_object(object, schema, path, out);
    }
    if let (Some(items), Some(item_schema)) = (value.as_array(), schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item, item_schema, &format!("{}[{}]", path, i), out);
        }
    }
}

fn check_number(n: f64, schema: &Map<String, Value>, path: &str, out: &mut Vec<String>) {
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if n < min {
            out.push(format!("{}: {} is below minimum {}", path, n, min));
        }
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if n > max {
            out.push(format!("{}: {} is above maximum {}", path, n, max));
        }
    }
}

fn check_length(len: usize, schema: &Map<String, Value>, path: &str, out: &mut Vec<String>) {
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if (len as u64) < min {
            out.push(format!("{}: length {} is below minLength {}", path, len, min));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if len as u64 > max {
            out.push(format!("{}: length {} is above maxLength {}", path, len, max));
        }
    }
}

fn check_object(
    object: &Map<String, Value>,
    schema: &Map<String, Value>,
    path: &str,
    out: &mut Vec<String>,
) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                out.push(format!("{}: missing required property {}", path, name));
            }
        }
    }
    if let Some(Value::Object(properties)) = schema.get("properties") {
        for (name, sub_schema) in properties {
            if let Some(child) = object.get(name) {
                check(child, sub_schema, &child_path(path, name), out);
            }
        }
    }
}

fn child_path(path: &str, name: &str) -> String {
    if path == ROOT {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn type_allowed(value: &Value, expected: &Value) -> bool {
    match expected {
        Value::String(name) => type_matches(value, name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| type_matches(value, name)),
        _ => true,
    }
}

fn type_matches(value: &Value, name: &str) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn expected_names(expected: &Value) -> String {
    match expected {
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.as_str().unwrap_or("any").to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
