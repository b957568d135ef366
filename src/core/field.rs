//! Field value types and validation

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Ordered attribute map of a record (attribute name -> value)
pub type Attributes = IndexMap<String, FieldValue>;

/// A polymorphic scalar value stored in a record column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    #[default]
    Null,
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value, parsing strings that hold a plain decimal
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::String(s) => parse_decimal(s),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Textual form used for comparisons, keying and query parameters.
    ///
    /// Booleans render as `1`/`0` so that `{"active": true}` filters match.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Boolean(true) => "1".to_string(),
            FieldValue::Boolean(false) => "0".to_string(),
            FieldValue::Null => String::new(),
        }
    }

    /// Convert a JSON value into a column value.
    ///
    /// Nested arrays and objects are kept as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            other => FieldValue::String(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Null => Value::Null,
        }
    }

    /// Loose equality: numeric when both sides are numeric, textual otherwise.
    /// Null never equals anything, as in SQL.
    pub fn loose_eq(&self, other: &FieldValue) -> bool {
        self.loose_cmp(other) == Some(Ordering::Equal)
    }

    /// Loose ordering with the same rules as [`FieldValue::loose_eq`]
    pub fn loose_cmp(&self, other: &FieldValue) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match (self.as_numeric(), other.as_numeric()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(self.to_text().cmp(&other.to_text())),
        }
    }

    /// Case-insensitive substring match on the textual form
    pub fn contains_text(&self, needle: &str) -> bool {
        if self.is_null() {
            return false;
        }
        self.to_text()
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }

    fn as_numeric(&self) -> Option<f64> {
        match self {
            FieldValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// Parse `[+-]digits[.digits]`, surrounding whitespace allowed.
///
/// Exponents, `inf` and `NaN` stay text.
pub fn parse_decimal(text: &str) -> Option<f64> {
    static DECIMAL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = DECIMAL_REGEX.get_or_init(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap());

    let text = text.trim();
    if !regex.is_match(text) {
        return None;
    }
    text.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Convert an attribute map into a JSON object
pub fn attributes_to_json(attributes: &Attributes) -> serde_json::Map<String, Value> {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}

/// Field format validators
#[derive(Debug, Clone)]
pub enum FieldFormat {
    Email,
    Url,
    Phone,
    Custom(Regex),
}

impl FieldFormat {
    /// Validate a field value against this format
    pub fn validate(&self, value: &FieldValue) -> bool {
        let string_value = match value.as_string() {
            Some(s) => s,
            None => return false,
        };

        match self {
            FieldFormat::Email => Self::is_valid_email(string_value),
            FieldFormat::Url => Self::is_valid_url(string_value),
            FieldFormat::Phone => Self::is_valid_phone(string_value),
            FieldFormat::Custom(regex) => regex.is_match(string_value),
        }
    }

    fn is_valid_email(email: &str) -> bool {
        static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = EMAIL_REGEX.get_or_init(|| {
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
        });
        regex.is_match(email)
    }

    fn is_valid_url(url: &str) -> bool {
        static URL_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = URL_REGEX.get_or_init(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap());
        regex.is_match(url)
    }

    fn is_valid_phone(phone: &str) -> bool {
        static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
        // E.164: 8 to 15 digits
        let regex = PHONE_REGEX.get_or_init(|| Regex::new(r"^\+?[1-9]\d{7,14}$").unwrap());
        regex.is_match(phone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_value_accessors() {
        let value = FieldValue::String("test".to_string());
        assert_eq!(value.as_string(), Some("test"));
        assert_eq!(value.as_integer(), None);
        assert!(!value.is_null());

        assert_eq!(FieldValue::Integer(42).as_integer(), Some(42));
        assert!(FieldValue::Null.is_null());
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(FieldValue::from_json(&json!(7)), FieldValue::Integer(7));
        assert_eq!(FieldValue::from_json(&json!(1.5)), FieldValue::Float(1.5));
        assert_eq!(FieldValue::from_json(&json!(true)), FieldValue::Boolean(true));
        assert_eq!(FieldValue::from_json(&json!(null)), FieldValue::Null);
        assert_eq!(
            FieldValue::from_json(&json!({"a": 1})),
            FieldValue::String("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn test_to_text_booleans_render_as_digits() {
        assert_eq!(FieldValue::Boolean(true).to_text(), "1");
        assert_eq!(FieldValue::Boolean(false).to_text(), "0");
        assert_eq!(FieldValue::Null.to_text(), "");
    }

    #[test]
    fn test_loose_eq_is_numeric_aware() {
        assert!(FieldValue::Integer(5).loose_eq(&FieldValue::from("5")));
        assert!(FieldValue::Float(5.0).loose_eq(&FieldValue::from("5")));
        assert!(FieldValue::Boolean(true).loose_eq(&FieldValue::from("1")));
        assert!(!FieldValue::from("abc").loose_eq(&FieldValue::from("ABC")));
        assert!(!FieldValue::Null.loose_eq(&FieldValue::from("")));
    }

    #[test]
    fn test_loose_cmp_numbers_and_text() {
        assert_eq!(
            FieldValue::Integer(10).loose_cmp(&FieldValue::from("9")),
            Some(Ordering::Greater)
        );
        assert_eq!(
            FieldValue::from("apple").loose_cmp(&FieldValue::from("banana")),
            Some(Ordering::Less)
        );
        assert_eq!(FieldValue::Null.loose_cmp(&FieldValue::Integer(1)), None);
    }

    #[test]
    fn test_only_plain_decimals_are_numeric() {
        assert_eq!(FieldValue::from(" 3.5 ").as_f64(), Some(3.5));
        assert_eq!(FieldValue::from("-.5").as_f64(), Some(-0.5));
        assert_eq!(FieldValue::from("+2.").as_f64(), Some(2.0));
        for text in ["1e3", "inf", "-Infinity", "NaN", "0x10", "", "1.2.3"] {
            assert_eq!(FieldValue::from(text).as_f64(), None, "text: {:?}", text);
        }

        assert!(FieldValue::Integer(1000).loose_eq(&FieldValue::from("1000.0")));
        assert!(!FieldValue::Integer(1000).loose_eq(&FieldValue::from("1e3")));
        assert!(FieldValue::from("NaN").loose_eq(&FieldValue::from("NaN")));
        assert_eq!(
            FieldValue::from("inf").loose_cmp(&FieldValue::Integer(5)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_contains_text_is_case_insensitive() {
        let value = FieldValue::from("Administrator");
        assert!(value.contains_text("admin"));
        assert!(value.contains_text("TRAT"));
        assert!(!value.contains_text("guest"));
        assert!(!FieldValue::Null.contains_text(""));
    }

    #[test]
    fn test_email_validation() {
        let format = FieldFormat::Email;

        assert!(format.validate(&FieldValue::from("test@example.com")));
        assert!(format.validate(&FieldValue::from("user.name+tag@example.co.uk")));
        assert!(!format.validate(&FieldValue::from("invalid-email")));
        assert!(!format.validate(&FieldValue::from("@example.com")));
        assert!(!format.validate(&FieldValue::Integer(42)));
    }

    #[test]
    fn test_url_and_phone_validation() {
        assert!(FieldFormat::Url.validate(&FieldValue::from("https://example.com")));
        assert!(!FieldFormat::Url.validate(&FieldValue::from("not a url")));
        assert!(FieldFormat::Phone.validate(&FieldValue::from("+33612345678")));
        assert!(!FieldFormat::Phone.validate(&FieldValue::from("123")));
    }

    #[test]
    fn test_serde_untagged_shape() {
        let json = serde_json::to_string(&FieldValue::Integer(3)).unwrap();
        assert_eq!(json, "3");
        let restored: FieldValue = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(restored, FieldValue::from("x"));
    }
}
