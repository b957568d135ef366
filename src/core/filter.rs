//! Filter and search parameter parsing
//!
//! Both `filter` and `search` carry JSON: a single object (one condition group)
//! or an array of objects (groups ORed together). Keys are attribute names,
//! values are comparison strings with an optional operator prefix:
//!
//! ```text
//! filter={"status":"active","age":">=18"}
//! filter=[{"name":"admin"},{"name":"guest"}]
//! search={"email":"example.com","name":"<>bot"}
//! ```
//!
//! Anything that is not an object or an array of objects yields no groups.

use crate::core::criteria::{Condition, Operator};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// One `attribute => raw value` entry of a condition group
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub attribute: String,
    /// Raw value including any operator prefix
    pub value: String,
}

/// Entries ANDed together
pub type ConditionGroup = Vec<FilterCondition>;

/// How values are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// `filter`: equality or prefixed comparison
    Exact,
    /// `search`: substring match
    Partial,
}

/// Parse raw filter JSON into condition groups
pub fn parse(raw: &str) -> Vec<ConditionGroup> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => vec![parse_object(&object)],
        Ok(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(parse_object)
            .collect(),
        Ok(_) => Vec::new(),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring undecodable filter parameter");
            Vec::new()
        }
    }
}

fn parse_object(object: &serde_json::Map<String, Value>) -> ConditionGroup {
    object
        .iter()
        .filter_map(|(attribute, value)| {
            scalar_text(value).map(|value| FilterCondition {
                attribute: attribute.clone(),
                value,
            })
        })
        .collect()
}

/// Text of a scalar JSON value; nested values are not comparable
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some("0".to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Split a raw value into its operator prefix and the remaining value
pub fn split_operator(raw: &str) -> (Option<Operator>, &str) {
    static PREFIX_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PREFIX_REGEX.get_or_init(|| Regex::new(r"^\s*(<>|<=|>=|<|>|=)").unwrap());

    let Some(captures) = regex.captures(raw) else {
        return (None, raw);
    };
    match (captures.get(0), captures.get(1)) {
        (Some(whole), Some(prefix)) => (Operator::from_prefix(prefix.as_str()), &raw[whole.end()..]),
        _ => (None, raw),
    }
}

/// Condition of a single entry, `None` when the entry places no restriction
pub fn entry_condition(entry: &FilterCondition, mode: MatchMode) -> Option<Condition> {
    match mode {
        MatchMode::Exact => {
            if entry.value.is_empty() {
                return Some(Condition::eq(entry.attribute.clone(), ""));
            }
            let (op, value) = split_operator(&entry.value);
            if value.is_empty() {
                return None;
            }
            Some(Condition::compare(
                entry.attribute.clone(),
                op.unwrap_or(Operator::Eq),
                value,
            ))
        }
        MatchMode::Partial => {
            let (op, value) = split_operator(&entry.value);
            if value.is_empty() {
                return None;
            }
            let op = match op {
                Some(Operator::Ne) => Operator::NotContains,
                _ => Operator::Contains,
            };
            Some(Condition::compare(entry.attribute.clone(), op, value))
        }
    }
}

/// Condition of a whole group: its entries ANDed
pub fn group_condition(group: &ConditionGroup, mode: MatchMode) -> Condition {
    let conditions: Vec<Condition> = group
        .iter()
        .filter_map(|entry| entry_condition(entry, mode))
        .collect();

    match conditions.len() {
        1 => conditions.into_iter().next().unwrap_or(Condition::All(Vec::new())),
        _ => Condition::All(conditions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(attribute: &str, value: &str) -> FilterCondition {
        FilterCondition {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_object_is_one_group() {
        let groups = parse(r#"{"name":"admin","description":"administrator"}"#);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0],
            vec![entry("name", "admin"), entry("description", "administrator")]
        );
    }

    #[test]
    fn test_array_keeps_only_object_elements() {
        let groups = parse(r#"[{"name":"admin"}, "junk", 4, {"name":"guest"}]"#);
        assert_eq!(groups, vec![vec![entry("name", "admin")], vec![entry("name", "guest")]]);
    }

    #[test]
    fn test_non_object_input_yields_nothing() {
        assert!(parse("").is_empty());
        assert!(parse("not json").is_empty());
        assert!(parse("42").is_empty());
        assert!(parse(r#""name""#).is_empty());
        assert!(parse("null").is_empty());
    }

    #[test]
    fn test_scalar_values_are_stringified() {
        let groups = parse(r#"{"age": 30, "active": true, "nested": {"a": 1}}"#);
        assert_eq!(groups[0], vec![entry("age", "30"), entry("active", "1")]);
    }

    #[test]
    fn test_split_operator_prefers_longest_prefix() {
        assert_eq!(split_operator("<>guest"), (Some(Operator::Ne), "guest"));
        assert_eq!(split_operator("<=5"), (Some(Operator::Le), "5"));
        assert_eq!(split_operator(">=5"), (Some(Operator::Ge), "5"));
        assert_eq!(split_operator("<5"), (Some(Operator::Lt), "5"));
        assert_eq!(split_operator("=x"), (Some(Operator::Eq), "x"));
        assert_eq!(split_operator("plain"), (None, "plain"));
    }

    #[test]
    fn test_exact_empty_value_is_strict_equality() {
        let condition = entry_condition(&entry("name", ""), MatchMode::Exact);
        assert_eq!(condition, Some(Condition::eq("name", "")));
    }

    #[test]
    fn test_partial_empty_value_places_no_restriction() {
        assert_eq!(entry_condition(&entry("name", ""), MatchMode::Partial), None);
    }

    #[test]
    fn test_exact_prefixed_value() {
        assert_eq!(
            entry_condition(&entry("age", ">18"), MatchMode::Exact),
            Some(Condition::compare("age", Operator::Gt, "18"))
        );
        assert_eq!(entry_condition(&entry("age", "<>"), MatchMode::Exact), None);
    }

    #[test]
    fn test_partial_forces_substring_match() {
        assert_eq!(
            entry_condition(&entry("name", ">adm"), MatchMode::Partial),
            Some(Condition::compare("name", Operator::Contains, "adm"))
        );
        assert_eq!(
            entry_condition(&entry("name", "<>adm"), MatchMode::Partial),
            Some(Condition::compare("name", Operator::NotContains, "adm"))
        );
    }

    #[test]
    fn test_group_condition_ands_entries() {
        let group = vec![entry("name", "admin"), entry("status", "active")];
        assert_eq!(
            group_condition(&group, MatchMode::Exact),
            Condition::All(vec![
                Condition::eq("name", "admin"),
                Condition::eq("status", "active"),
            ])
        );
        assert_eq!(
            group_condition(&vec![entry("name", "admin")], MatchMode::Exact),
            Condition::eq("name", "admin")
        );
    }
}
