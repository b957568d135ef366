//! Reusable field validators
//!
//! Validators are closures receiving the attribute name and its JSON value.
//! Most of them only judge values of the type they understand and let other
//! values through, so they combine with [`required`].

use crate::core::field::{FieldFormat, FieldValue};
use serde_json::Value;

/// Human label of an attribute: `first_name` -> `First Name`
pub fn label(field: &str) -> String {
    field
        .split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Validator: field is required (not null, not blank)
pub fn required() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| {
        let blank = match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if blank {
            Err(format!("{} cannot be blank.", label(field)))
        } else {
            Ok(())
        }
    }
}

/// Validator: number must be positive
pub fn positive() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| match number(value) {
        Some(num) if num <= 0.0 => Err(format!("{} must be greater than 0.", label(field))),
        _ => Ok(()),
    }
}

/// Validator: value must be an integer (numbers or numeric strings)
pub fn integer() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| {
        let valid = match value {
            Value::Null => true,
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.is_empty() || s.trim().parse::<i64>().is_ok(),
            _ => false,
        };
        if valid {
            Ok(())
        } else {
            Err(format!("{} must be an integer.", label(field)))
        }
    }
}

/// Validator: string length must be within range
pub fn string_length(
    min: usize,
    max: usize,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        if let Some(s) = value.as_str() {
            let len = s.chars().count();
            if len < min {
                Err(format!(
                    "{} is too short (minimum is {} characters).",
                    label(field),
                    min
                ))
            } else if len > max {
                Err(format!(
                    "{} is too long (maximum is {} characters).",
                    label(field),
                    max
                ))
            } else {
                Ok(())
            }
        } else {
            Ok(())
        }
    }
}

/// Validator: number must not exceed maximum
pub fn max_value(max: f64) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match number(value) {
        Some(num) if num > max => Err(format!("{} is too big (maximum is {}).", label(field), max)),
        _ => Ok(()),
    }
}

/// Validator: value must be in allowed list
pub fn in_list(
    allowed: Vec<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        if let Some(s) = value.as_str() {
            if !allowed.iter().any(|a| a == s) {
                return Err(format!("{} is not in the list.", label(field)));
            }
        }
        Ok(())
    }
}

/// Validator: date must match format
pub fn date_format(
    format: &'static str,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        if let Some(s) = value.as_str() {
            match chrono::NaiveDate::parse_from_str(s, format) {
                Ok(_) => Ok(()),
                Err(_) => Err(format!("The format of {} is invalid.", label(field))),
            }
        } else {
            Ok(())
        }
    }
}

/// Validator: string must be an email address
pub fn email() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| match value.as_str() {
        Some(s) if !s.is_empty() && !FieldFormat::Email.validate(&FieldValue::from(s)) => {
            Err(format!("{} is not a valid email address.", label(field)))
        }
        _ => Ok(()),
    }
}

/// Validator: non-empty strings must match a [`FieldFormat`]
pub fn matches_format(
    format: FieldFormat,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_str() {
        Some(s) if !s.is_empty() && !format.validate(&FieldValue::from(s)) => {
            Err(format!("The format of {} is invalid.", label(field)))
        }
        _ => Ok(()),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label() {
        assert_eq!(label("email"), "Email");
        assert_eq!(label("first_name"), "First Name");
    }

    // === required() ===

    #[test]
    fn test_required_null_value_returns_error() {
        let v = required();
        assert_eq!(v("name", &json!(null)), Err("Name cannot be blank.".to_string()));
    }

    #[test]
    fn test_required_blank_string_returns_error() {
        let v = required();
        assert!(v("name", &json!("   ")).is_err());
    }

    #[test]
    fn test_required_values_return_ok() {
        let v = required();
        assert!(v("name", &json!("hello")).is_ok());
        assert!(v("age", &json!(0)).is_ok());
        assert!(v("active", &json!(false)).is_ok());
    }

    // === positive() / max_value() / integer() ===

    #[test]
    fn test_positive() {
        let v = positive();
        assert!(v("price", &json!(-5.0)).is_err());
        assert!(v("price", &json!(0)).is_err());
        assert!(v("price", &json!("3")).is_ok());
        assert!(v("name", &json!("hello")).is_ok());
    }

    #[test]
    fn test_max_value() {
        let v = max_value(100.0);
        assert!(v("score", &json!(101)).is_err());
        assert!(v("score", &json!(100)).is_ok());
        assert!(v("score", &json!(null)).is_ok());
    }

    #[test]
    fn test_integer() {
        let v = integer();
        assert!(v("age", &json!(3)).is_ok());
        assert!(v("age", &json!("12")).is_ok());
        assert!(v("age", &json!(1.5)).is_err());
        assert!(v("age", &json!("abc")).is_err());
    }

    // === string_length() ===

    #[test]
    fn test_string_length_bounds() {
        let v = string_length(3, 5);
        assert!(v("name", &json!("ab")).unwrap_err().contains("minimum is 3"));
        assert!(v("name", &json!("abcdef")).unwrap_err().contains("maximum is 5"));
        assert!(v("name", &json!("abc")).is_ok());
        assert!(v("name", &json!("héllo")).is_ok());
        assert!(v("age", &json!(42)).is_ok());
    }

    // === in_list() ===

    #[test]
    fn test_in_list() {
        let v = in_list(vec!["active".into(), "inactive".into()]);
        assert!(v("status", &json!("active")).is_ok());
        assert_eq!(
            v("status", &json!("deleted")),
            Err("Status is not in the list.".to_string())
        );
        assert!(v("flag", &json!(42)).is_ok());
    }

    // === date_format() ===

    #[test]
    fn test_date_format() {
        let v = date_format("%Y-%m-%d");
        assert!(v("birthday", &json!("2024-01-15")).is_ok());
        assert!(v("birthday", &json!("15/01/2024")).is_err());
        assert!(v("birthday", &json!(12345)).is_ok());
    }

    // === email() ===

    #[test]
    fn test_email() {
        let v = email();
        assert!(v("email", &json!("alice@example.com")).is_ok());
        assert_eq!(
            v("email", &json!("alice")),
            Err("Email is not a valid email address.".to_string())
        );
        assert!(v("email", &json!("")).is_ok());
    }

    // === matches_format() ===

    #[test]
    fn test_matches_format() {
        let url = matches_format(FieldFormat::Url);
        assert!(url("homepage", &json!("https://example.com/a")).is_ok());
        assert_eq!(
            url("homepage", &json!("example")),
            Err("The format of Homepage is invalid.".to_string())
        );

        let phone = matches_format(FieldFormat::Phone);
        assert!(phone("phone", &json!("+33612345678")).is_ok());
        assert!(phone("phone", &json!("12")).is_err());
        assert!(phone("phone", &json!("")).is_ok());

        let code = matches_format(FieldFormat::Custom(regex::Regex::new(r"^[A-Z]{3}$").unwrap()));
        assert!(code("code", &json!("ABC")).is_ok());
        assert!(code("code", &json!("abcd")).is_err());
    }
}
