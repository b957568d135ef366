//! Selection criteria: predicate tree, pagination and ordering
//!
//! A [`Selection`] is what a controller hands to a store. It is built from the
//! request's query parameters, the controller's defaults and the controller's
//! base condition, which is ANDed into every selection and cannot be bypassed
//! by client input.

use crate::core::field::{Attributes, FieldValue};
use crate::core::filter::{self, MatchMode};
use crate::core::query::QueryParams;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of rows returned by a list
pub const DEFAULT_LIMIT: i64 = 100;

/// Comparison operator of a single condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    /// Case-insensitive substring match
    Contains,
    NotContains,
}

impl Operator {
    /// Operator written as a filter value prefix (`<>`, `<=`, `>=`, `<`, `>`, `=`)
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "<>" => Some(Operator::Ne),
            "<=" => Some(Operator::Le),
            ">=" => Some(Operator::Ge),
            "<" => Some(Operator::Lt),
            ">" => Some(Operator::Gt),
            "=" => Some(Operator::Eq),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Contains => "LIKE",
            Operator::NotContains => "NOT LIKE",
        }
    }

    /// Apply the operator to a stored value and a condition value
    pub fn apply(&self, stored: &FieldValue, expected: &FieldValue) -> bool {
        use std::cmp::Ordering::*;

        match self {
            Operator::Eq => stored.loose_eq(expected),
            Operator::Ne => matches!(stored.loose_cmp(expected), Some(Less | Greater)),
            Operator::Lt => stored.loose_cmp(expected) == Some(Less),
            Operator::Gt => stored.loose_cmp(expected) == Some(Greater),
            Operator::Le => matches!(stored.loose_cmp(expected), Some(Less | Equal)),
            Operator::Ge => matches!(stored.loose_cmp(expected), Some(Greater | Equal)),
            Operator::Contains => stored.contains_text(&expected.to_text()),
            Operator::NotContains => {
                !stored.is_null() && !stored.contains_text(&expected.to_text())
            }
        }
    }
}

/// Predicate tree evaluated against a row
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Every child must hold (an empty list always holds)
    All(Vec<Condition>),
    /// At least one child must hold (an empty list always holds)
    Any(Vec<Condition>),
    Compare {
        attribute: String,
        op: Operator,
        value: FieldValue,
    },
}

impl Condition {
    pub fn compare(attribute: impl Into<String>, op: Operator, value: impl Into<FieldValue>) -> Self {
        Condition::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    /// `attribute = value`
    pub fn eq(attribute: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::compare(attribute, Operator::Eq, value)
    }

    /// Whether the condition places no restriction at all
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::All(children) | Condition::Any(children) => {
                children.iter().all(Condition::is_empty)
            }
            Condition::Compare { .. } => false,
        }
    }

    /// AND another condition into this one; empty sides are dropped
    pub fn and(self, other: Condition) -> Condition {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other,
            (_, true) => self,
            _ => match self {
                Condition::All(mut children) => {
                    children.push(other);
                    Condition::All(children)
                }
                this => Condition::All(vec![this, other]),
            },
        }
    }

    /// Every attribute name referenced by the tree
    pub fn attributes(&self) -> Vec<&str> {
        match self {
            Condition::All(children) | Condition::Any(children) => {
                children.iter().flat_map(Condition::attributes).collect()
            }
            Condition::Compare { attribute, .. } => vec![attribute.as_str()],
        }
    }

    /// Evaluate the condition against a row. Missing attributes read as null.
    pub fn matches(&self, row: &Attributes) -> bool {
        match self {
            Condition::All(children) => children.iter().all(|c| c.matches(row)),
            Condition::Any(children) => {
                children.is_empty() || children.iter().any(|c| c.matches(row))
            }
            Condition::Compare {
                attribute,
                op,
                value,
            } => {
                let stored = row.get(attribute).cloned().unwrap_or_default();
                op.apply(&stored, value)
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::All(children) => write!(f, "{}", join_conditions(children, " AND ")),
            Condition::Any(children) => write!(f, "{}", join_conditions(children, " OR ")),
            Condition::Compare {
                attribute,
                op,
                value,
            } => match op {
                Operator::Contains | Operator::NotContains => {
                    write!(f, "{} {} '%{}%'", attribute, op.as_sql(), value.to_text())
                }
                _ => write!(f, "{}{}'{}'", attribute, op.as_sql(), value.to_text()),
            },
        }
    }
}

fn join_conditions(children: &[Condition], glue: &str) -> String {
    children
        .iter()
        .map(|c| format!("({})", c))
        .collect::<Vec<_>>()
        .join(glue)
}

/// Sort direction of an order term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Parse an order clause such as `"name DESC, id"`.
///
/// Returns `None` when a term is malformed.
pub fn parse_order(clause: &str) -> Option<Vec<(String, Direction)>> {
    let mut terms = Vec::new();

    for term in clause.split(',') {
        let mut parts = term.split_whitespace();
        let Some(attribute) = parts.next() else {
            continue;
        };
        let direction = match parts.next().map(|d| d.to_ascii_uppercase()) {
            None => Direction::Asc,
            Some(d) if d == "ASC" => Direction::Asc,
            Some(d) if d == "DESC" => Direction::Desc,
            Some(_) => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        terms.push((attribute.to_string(), direction));
    }

    Some(terms)
}

/// Pagination and ordering defaults of a controller
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaDefaults {
    pub limit: i64,
    pub offset: i64,
    /// Order clause; `None` means "identifier ascending"
    pub order: Option<String>,
}

impl Default for CriteriaDefaults {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            order: None,
        }
    }
}

/// Selection handed to a store
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Maximum rows; a negative value means no limit
    pub limit: i64,
    /// Rows to skip; negative values read as zero
    pub offset: i64,
    pub order: String,
    pub condition: Option<Condition>,
    /// Relation names to load eagerly
    pub with: Vec<String>,
}

impl Selection {
    /// Unpaginated selection ordered by identifier
    pub fn unbounded(id_field: &str) -> Self {
        Self {
            limit: -1,
            offset: 0,
            order: format!("{} ASC", id_field),
            condition: None,
            with: Vec::new(),
        }
    }

    /// Selection of a single row by identifier, restricted by the base condition
    pub fn by_id(id_field: &str, id: &str, base: Option<&Condition>) -> Self {
        let mut selection = Self::unbounded(id_field);
        selection.limit = 1;
        selection.condition = Some(Condition::eq(id_field, id));
        selection.restrict(base)
    }

    /// AND the base condition into the selection
    pub fn restrict(mut self, base: Option<&Condition>) -> Self {
        if let Some(base) = base {
            self.condition = Some(match self.condition.take() {
                Some(condition) => condition.and(base.clone()),
                None => base.clone(),
            });
        }
        self
    }

    pub fn with_relations(mut self, relations: Vec<String>) -> Self {
        self.with = relations;
        self
    }

    /// Offset clamped at zero
    pub fn start(&self) -> i64 {
        self.offset.max(0)
    }
}

/// Condition built from the request's `filter` and `search` parameters.
///
/// Filter groups and search groups are ORed together. Returns `None` when the
/// request carries no usable condition.
pub fn request_condition(params: &QueryParams) -> Option<Condition> {
    let mut groups = Vec::new();

    let sources = [
        (params.filter.as_deref(), MatchMode::Exact),
        (params.search.as_deref(), MatchMode::Partial),
    ];
    for (raw, mode) in sources {
        let Some(raw) = raw else { continue };
        for group in filter::parse(raw) {
            let condition = filter::group_condition(&group, mode);
            if !condition.is_empty() {
                groups.push(condition);
            }
        }
    }

    match groups.len() {
        0 => None,
        1 => groups.pop(),
        _ => Some(Condition::Any(groups)),
    }
}

/// Build the selection of a list request.
///
/// Query parameters override the defaults key by key. The base condition is
/// always ANDed in.
pub fn build_selection(
    params: &QueryParams,
    defaults: &CriteriaDefaults,
    id_field: &str,
    base: Option<&Condition>,
) -> Selection {
    let order = params
        .order
        .clone()
        .filter(|o| !o.trim().is_empty())
        .or_else(|| defaults.order.clone())
        .unwrap_or_else(|| format!("{} ASC", id_field));

    Selection {
        limit: params.limit.unwrap_or(defaults.limit),
        offset: params.offset.unwrap_or(defaults.offset),
        order,
        condition: request_condition(params),
        with: Vec::new(),
    }
    .restrict(base)
}

/// Selection of the rows targeted by an update or delete without identifier
pub fn lookup_selection(params: &QueryParams, id_field: &str, base: Option<&Condition>) -> Selection {
    let mut selection = Selection::unbounded(id_field);
    selection.condition = request_condition(params);
    selection.restrict(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, FieldValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_defaults_apply_without_params() {
        let selection = build_selection(&QueryParams::default(), &CriteriaDefaults::default(), "id", None);
        assert_eq!(selection.limit, 100);
        assert_eq!(selection.offset, 0);
        assert_eq!(selection.order, "id ASC");
        assert_eq!(selection.condition, None);
    }

    #[test]
    fn test_params_override_key_by_key() {
        let params = QueryParams::from_query_str("limit=5&order=name%20DESC");
        let selection = build_selection(&params, &CriteriaDefaults::default(), "id", None);
        assert_eq!(selection.limit, 5);
        assert_eq!(selection.offset, 0);
        assert_eq!(selection.order, "name DESC");
    }

    #[test]
    fn test_base_condition_is_always_anded() {
        let base = Condition::eq("tenant_id", 7);
        let params = QueryParams::from_query_str(r#"filter=[{"name":"a"},{"tenant_id":"8"}]"#);
        let selection = build_selection(&params, &CriteriaDefaults::default(), "id", Some(&base));
        let condition = selection.condition.unwrap();

        // tenant 8 matches the client filter but not the base condition
        let other_tenant = row(&[("name", "b".into()), ("tenant_id", 8.into())]);
        assert!(!condition.matches(&other_tenant));

        let own_tenant = row(&[("name", "a".into()), ("tenant_id", 7.into())]);
        assert!(condition.matches(&own_tenant));
    }

    #[test]
    fn test_base_condition_without_filter() {
        let base = Condition::eq("tenant_id", 7);
        let selection = build_selection(&QueryParams::default(), &CriteriaDefaults::default(), "id", Some(&base));
        assert_eq!(selection.condition, Some(base));
    }

    #[test]
    fn test_filter_and_search_are_ored() {
        let params = QueryParams::from_query_str(r#"filter={"name":"bob"}&search={"email":"example"}"#);
        let condition = request_condition(&params).unwrap();

        assert!(condition.matches(&row(&[("name", "bob".into()), ("email", "x@y.io".into())])));
        assert!(condition.matches(&row(&[("name", "amy".into()), ("email", "amy@example.com".into())])));
        assert!(!condition.matches(&row(&[("name", "amy".into()), ("email", "amy@y.io".into())])));
    }

    #[test]
    fn test_by_id_selection() {
        let selection = Selection::by_id("id", "3", None);
        assert_eq!(selection.limit, 1);
        assert!(selection.condition.unwrap().matches(&row(&[("id", 3.into())])));
    }

    #[test]
    fn test_and_drops_empty_sides() {
        let c = Condition::eq("a", 1);
        assert_eq!(Condition::All(vec![]).and(c.clone()), c);
        assert_eq!(c.clone().and(Condition::Any(vec![])), c);
    }

    #[test]
    fn test_operators() {
        let stored = FieldValue::Integer(10);
        assert!(Operator::Gt.apply(&stored, &"9".into()));
        assert!(Operator::Le.apply(&stored, &"10".into()));
        assert!(Operator::Ne.apply(&stored, &"11".into()));
        assert!(!Operator::Ne.apply(&FieldValue::Null, &"11".into()));
        assert!(Operator::NotContains.apply(&"guest".into(), &"adm".into()));
    }

    #[test]
    fn test_parse_order() {
        assert_eq!(
            parse_order("name DESC, id"),
            Some(vec![
                ("name".to_string(), Direction::Desc),
                ("id".to_string(), Direction::Asc)
            ])
        );
        assert_eq!(parse_order("name sideways"), None);
        assert_eq!(parse_order("name ASC extra"), None);
    }

    #[test]
    fn test_display_reads_like_sql() {
        let condition = Condition::Any(vec![
            Condition::eq("name", "admin"),
            Condition::compare("email", Operator::Contains, "adm"),
        ]);
        assert_eq!(condition.to_string(), "(name='admin') OR (email LIKE '%adm%')");
    }
}
