//! Request context and body decoding
//!
//! A [`RequestContext`] is built once per request from the transport and is
//! read-only afterwards. Bodies are decoded as JSON first and fall back to
//! `application/x-www-form-urlencoded` with bracket keys
//! (`0[name]=a&0[email]=b`).

use crate::core::query::QueryParams;
use axum::http::Method;
use serde_json::{Map, Value};
use std::fmt;

/// HTTP verb of a request, as far as controllers are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Verb::Get),
            Method::POST => Some(Verb::Post),
            Method::PUT | Method::PATCH => Some(Verb::Put),
            Method::DELETE => Some(Verb::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Everything a controller operation reads from the request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub verb: Verb,
    /// Identifier from the path, if any
    pub id: Option<String>,
    /// Decoded body (`Value::Null` when absent)
    pub body: Value,
    pub params: QueryParams,
}

impl RequestContext {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            id: None,
            body: Value::Null,
            params: QueryParams::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Parse and attach a raw query string
    pub fn with_query(mut self, query: &str) -> Self {
        self.params = QueryParams::from_query_str(query);
        self
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// Identifier from the path, falling back to the `id` query parameter
    pub fn request_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.params.id())
    }

    pub fn is_collection(&self) -> bool {
        is_collection(&self.body)
    }

    pub fn has_data(&self) -> bool {
        !is_empty_body(&self.body)
    }
}

/// Whether a body represents several entities.
///
/// True only for a non-empty list whose every element is an object.
pub fn is_collection(body: &Value) -> bool {
    match body {
        Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_object),
        _ => false,
    }
}

/// Null, empty objects, empty lists and empty strings carry no data
pub fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(object) => object.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Decode a raw request body.
///
/// JSON objects and arrays are taken as-is. Other JSON documents carry no
/// data. Anything that is not JSON is decoded as a form.
pub fn decode_body(raw: &[u8]) -> Value {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }

    match serde_json::from_slice::<Value>(raw) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        Ok(_) => Value::Null,
        Err(_) => decode_form(raw),
    }
}

/// Decode a form body, expanding bracket keys into nested values
pub fn decode_form(raw: &[u8]) -> Value {
    let pairs = match serde_urlencoded::from_bytes::<Vec<(String, String)>>(raw) {
        Ok(pairs) => pairs,
        Err(e) => {
            tracing::debug!(error = %e, "Body is neither JSON nor form data");
            return Value::Null;
        }
    };

    let mut root = Value::Object(Map::new());
    for (key, value) in pairs {
        let path = split_key(&key);
        if path.is_empty() {
            continue;
        }
        insert_path(&mut root, &path, Value::String(value));
    }

    let root = sequential_to_list(root);
    if is_empty_body(&root) { Value::Null } else { root }
}

/// `a[b][]` -> `["a", "b", ""]`
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 {
        return Vec::new();
    }

    let mut path = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        path.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }
    path
}

fn insert_path(node: &mut Value, path: &[String], value: Value) {
    let Some((head, tail)) = path.split_first() else {
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(object) = node else {
        return;
    };

    // `[]` appends at the next numeric key
    let key = if head.is_empty() {
        object
            .keys()
            .filter_map(|k| k.parse::<usize>().ok())
            .max()
            .map(|n| n + 1)
            .unwrap_or(0)
            .to_string()
    } else {
        head.clone()
    };

    if tail.is_empty() {
        object.insert(key, value);
    } else {
        let child = object.entry(key).or_insert(Value::Null);
        insert_path(child, tail, value);
    }
}

/// Turn objects keyed exactly `0..n` into lists, recursively
fn sequential_to_list(value: Value) -> Value {
    match value {
        Value::Object(object) => {
            let sequential = !object.is_empty()
                && object
                    .keys()
                    .enumerate()
                    .all(|(i, k)| k.parse::<usize>().ok() == Some(i));
            if sequential {
                Value::Array(object.into_iter().map(|(_, v)| sequential_to_list(v)).collect())
            } else {
                Value::Object(
                    object
                        .into_iter()
                        .map(|(k, v)| (k, sequential_to_list(v)))
                        .collect(),
                )
            }
        }
        other => other,
    }
}
