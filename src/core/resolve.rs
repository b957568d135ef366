//! Record resolution: which entities an operation acts on
//!
//! Planning is pure: it looks at the path identifier and the body shape.
//! A creation plan holds one fresh entity per input element. A lookup plan
//! decides, per input element, whether its rows are addressed by identifier or
//! matched by `filter`/`search`. Controllers then execute the plan against
//! their store.

use crate::core::request::{RequestContext, is_collection};
use serde_json::{Map, Value};

/// How the existing rows of one input element are found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Exactly one row, 404 when absent
    Id(String),
    /// Zero or more rows matched by the request's filter and search
    Criteria,
}

/// One input element; `L` says how its rows are found
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTarget<L> {
    /// Position of the element in the request body
    pub position: usize,
    pub lookup: L,
    /// Client attributes to assign (empty for deletes)
    pub data: Map<String, Value>,
}

/// Resolution plan of a request
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPlan<L> {
    pub targets: Vec<PlannedTarget<L>>,
    /// The body was a collection
    pub collection: bool,
    /// Results are returned as a list rather than a single object
    pub list_result: bool,
}

/// Plan a creation: every element becomes a fresh entity and client
/// identifiers play no part in resolution
pub fn plan_creation(ctx: &RequestContext) -> TargetPlan<()> {
    let collection = is_collection(&ctx.body);
    TargetPlan {
        targets: input_elements(&ctx.body, collection)
            .into_iter()
            .enumerate()
            .map(|(position, data)| PlannedTarget {
                position,
                lookup: (),
                data,
            })
            .collect(),
        collection,
        list_result: collection,
    }
}

/// Plan an update or a delete of existing rows
pub fn plan_lookups(ctx: &RequestContext, id_field: &str) -> TargetPlan<Lookup> {
    let collection = is_collection(&ctx.body);
    let elements = input_elements(&ctx.body, collection);

    if collection {
        return TargetPlan {
            targets: elements
                .into_iter()
                .enumerate()
                .map(|(position, data)| {
                    let lookup = element_id(&data, id_field)
                        .or_else(|| ctx.request_id().map(str::to_string))
                        .map(Lookup::Id)
                        .unwrap_or(Lookup::Criteria);
                    PlannedTarget {
                        position,
                        lookup,
                        data,
                    }
                })
                .collect(),
            collection,
            list_result: true,
        };
    }

    let id = ctx.request_id().map(str::to_string);
    let list_result = id.is_none();
    let lookup = id.map(Lookup::Id).unwrap_or(Lookup::Criteria);
    let data = elements.into_iter().next().unwrap_or_default();
    TargetPlan {
        targets: vec![PlannedTarget {
            position: 0,
            lookup,
            data,
        }],
        collection,
        list_result,
    }
}

/// Body elements as attribute maps; non-object bodies yield one empty map
fn input_elements(body: &Value, collection: bool) -> Vec<Map<String, Value>> {
    if collection {
        if let Value::Array(items) = body {
            return items
                .iter()
                .filter_map(Value::as_object)
                .cloned()
                .collect();
        }
    }
    vec![body.as_object().cloned().unwrap_or_default()]
}

/// Identifier carried by a collection element
fn element_id(data: &Map<String, Value>, id_field: &str) -> Option<String> {
    match data.get(id_field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Merge priority data over client data; priority keys always win
pub fn merge_priority(data: &Map<String, Value>, priority: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = data.clone();
    for (key, value) in priority {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
