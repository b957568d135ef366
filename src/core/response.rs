//! Operation results, response shaping and serialization providers

use crate::core::error::ApiError;
use crate::core::relations::AttributeList;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::fmt;

/// Terminal result of a controller operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub status: StatusCode,
    pub payload: Value,
    pub headers: Vec<(HeaderName, String)>,
}

impl OperationResult {
    /// Successful result with status 200
    pub fn ok(payload: Value) -> Self {
        Self {
            status: StatusCode::OK,
            payload,
            headers: Vec::new(),
        }
    }

    pub fn from_error(error: &ApiError) -> Self {
        Self {
            status: error.status_code(),
            payload: error.to_payload(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Restrict a successful payload to the allow-listed attributes.
    ///
    /// Error payloads and non-200 results pass through untouched.
    pub fn shaped(mut self, safe_attributes: &AttributeList) -> Self {
        if self.status == StatusCode::OK && !safe_attributes.is_empty() {
            self.payload = project_payload(self.payload, safe_attributes);
        }
        self
    }

    /// Serialize with the given provider
    pub fn into_response_with(self, provider: &dyn ResponseProvider) -> Response {
        provider.send(self)
    }
}

impl IntoResponse for OperationResult {
    fn into_response(self) -> Response {
        JsonResponseProvider.send(self)
    }
}

fn project_payload(payload: Value, safe: &AttributeList) -> Value {
    match payload {
        Value::Object(object) => Value::Object(safe.project(&object)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(object) => Value::Object(safe.project(&object)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

// =============================================================================
// Content-Range
// =============================================================================

/// Range of rows returned by a list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: i64,
    pub end: i64,
    pub total: i64,
}

impl ContentRange {
    /// `end = min(total - 1, limit + start - 1)`, with `start` clamped at zero.
    /// A negative limit means the list was unbounded.
    pub fn compute(total: i64, offset: i64, limit: i64) -> Self {
        let start = offset.max(0);
        let end = if limit < 0 {
            total - 1
        } else {
            (total - 1).min(limit.saturating_add(start).saturating_sub(1))
        };
        Self { start, end, total }
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "items {}-{}/{}", self.start, self.end, self.total)
    }
}

// =============================================================================
// Response providers
// =============================================================================

/// Requested serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
}

impl ResponseFormat {
    /// Parse the `format` parameter; unknown values fall back to JSON
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(|p| p.trim().to_lowercase()).as_deref() {
            Some("xml") => ResponseFormat::Xml,
            _ => ResponseFormat::Json,
        }
    }

    pub fn provider(&self) -> Box<dyn ResponseProvider> {
        match self {
            ResponseFormat::Json => Box::new(JsonResponseProvider),
            ResponseFormat::Xml => Box::new(XmlResponseProvider),
        }
    }
}

/// Serializes operation results for the transport
pub trait ResponseProvider: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn render(&self, payload: &Value) -> String;

    /// Build the HTTP response: status, content type, extra headers, body
    fn send(&self, result: OperationResult) -> Response {
        let body = self.render(&result.payload);
        let mut response = (result.status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type()));
        for (name, value) in result.headers {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(e) => tracing::warn!(header = %name, error = %e, "Dropping invalid header value"),
            }
        }
        response
    }
}

pub struct JsonResponseProvider;

impl ResponseProvider for JsonResponseProvider {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn render(&self, payload: &Value) -> String {
        payload.to_string()
    }
}

/// Renders payloads under a `<response>` root.
///
/// Numeric keys and list items become `item<N>` elements.
pub struct XmlResponseProvider;

impl ResponseProvider for XmlResponseProvider {
    fn content_type(&self) -> &'static str {
        "text/xml"
    }

    fn render(&self, payload: &Value) -> String {
        let mut out = String::from("<?xml version=\"1.0\"?>\n<response>");
        write_xml_children(payload, &mut out);
        out.push_str("</response>\n");
        out
    }
}

fn write_xml_children(value: &Value, out: &mut String) {
    match value {
        Value::Object(object) => {
            for (key, child) in object {
                write_xml_element(&xml_name(key), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                write_xml_element(&format!("item{}", index), child, out);
            }
        }
        scalar => out.push_str(&xml_escape(&scalar_text(scalar))),
    }
}

fn write_xml_element(name: &str, value: &Value, out: &mut String) {
    out.push('<');
    out.push_str(name);
    out.push('>');
    write_xml_children(value, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn xml_name(key: &str) -> String {
    let numeric = !key.is_empty() && key.chars().all(|c| c.is_ascii_digit());
    if numeric {
        return format!("item{}", key);
    }
    let name: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect();
    match name.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => name,
        _ => format!("_{}", name),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The fixed 403 result
pub fn access_denied() -> OperationResult {
    OperationResult::from_error(&ApiError::AccessDenied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_range_examples() {
        assert_eq!(ContentRange::compute(37, 10, 100).end, 36);
        assert_eq!(ContentRange::compute(200, 0, 50).end, 49);
        assert_eq!(ContentRange::compute(200, 0, 50).to_string(), "items 0-49/200");
    }

    #[test]
    fn test_content_range_edges() {
        assert_eq!(ContentRange::compute(0, 0, 100).to_string(), "items 0--1/0");
        assert_eq!(ContentRange::compute(10, -5, 3).to_string(), "items 0-2/10");
        assert_eq!(ContentRange::compute(10, 0, -1).to_string(), "items 0-9/10");
    }

    #[test]
    fn test_content_range_extreme_pagination() {
        assert_eq!(ContentRange::compute(3, 5, i64::MAX).to_string(), "items 5-2/3");
        assert_eq!(
            ContentRange::compute(3, i64::MAX, 100),
            ContentRange { start: i64::MAX, end: 2, total: 3 }
        );
        assert_eq!(
            ContentRange::compute(3, i64::MAX, i64::MAX),
            ContentRange { start: i64::MAX, end: 2, total: 3 }
        );
    }

    #[test]
    fn test_shaping_applies_only_on_success() {
        let safe: AttributeList = ["id", "name"].into_iter().collect();

        let ok = OperationResult::ok(json!([{"id": 1, "name": "a", "password": "x"}])).shaped(&safe);
        assert_eq!(ok.payload, json!([{"id": 1, "name": "a"}]));

        let err = OperationResult::from_error(&ApiError::NotFound).shaped(&safe);
        assert_eq!(err.payload, json!({"error": ["Not found"]}));
    }

    #[test]
    fn test_shaping_without_allow_list_is_identity() {
        let payload = json!({"id": 1, "secret": "x"});
        let result = OperationResult::ok(payload.clone()).shaped(&AttributeList::default());
        assert_eq!(result.payload, payload);
    }

    #[test]
    fn test_format_negotiation() {
        assert_eq!(ResponseFormat::from_param(None), ResponseFormat::Json);
        assert_eq!(ResponseFormat::from_param(Some("XML")), ResponseFormat::Xml);
        assert_eq!(ResponseFormat::from_param(Some("yaml")), ResponseFormat::Json);
    }

    #[test]
    fn test_xml_rendering() {
        let xml = XmlResponseProvider.render(&json!([{"id": 1, "name": "a&b"}]));
        assert_eq!(
            xml,
            "<?xml version=\"1.0\"?>\n<response><item0><id>1</id><name>a&amp;b</name></item0></response>\n"
        );
    }

    #[test]
    fn test_xml_numeric_keys_and_errors() {
        let xml = XmlResponseProvider.render(&json!({"error": ["Not found"], "42": {"x": null}}));
        assert!(xml.contains("<error><item0>Not found</item0></error>"));
        assert!(xml.contains("<item42><x></x></item42>"));
    }

    #[test]
    fn test_access_denied_result() {
        let result = access_denied();
        assert_eq!(result.status, StatusCode::FORBIDDEN);
        assert_eq!(
            result.payload,
            json!({"error": {"access": "You do not have sufficient permissions to access."}})
        );
    }

    #[test]
    fn test_send_sets_content_type_and_headers() {
        let result = OperationResult::ok(json!([])).with_header(
            HeaderName::from_static("content-range"),
            "items 0--1/0",
        );
        let response = XmlResponseProvider.send(result);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/xml");
        assert_eq!(response.headers()["content-range"], "items 0--1/0");
    }
}
