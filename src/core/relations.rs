//! Relation configuration and embedding
//!
//! A controller declares which relations clients may request through the
//! `with` parameter, and how each one is rendered:
//!
//! ```yaml
//! relations:
//!   comments:
//!     relationName: comments
//!     columnName: comments
//!     return: array
//!     keyField: id
//!     safeAttributes: id, text
//!   owner:
//!     relationName: author
//!     return: object
//! ```

use crate::core::entity::{Entity, RelatedData};
use crate::core::error::ApiError;
use crate::core::field::attributes_to_json;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// How a single related record is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnMode {
    /// Full representation of the related record
    #[default]
    Object,
    /// Attribute map reduced to the allow-list
    Array,
}

/// List of attribute names, written as a list or a comma-separated string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttributeList(pub Vec<String>);

impl AttributeList {
    /// Split and trim a comma-separated list, skipping empty entries
    pub fn from_csv(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// Keep only the listed keys of an object
    pub fn project(&self, object: &Map<String, Value>) -> Map<String, Value> {
        object
            .iter()
            .filter(|(k, _)| self.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<'de> Deserialize<'de> for AttributeList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Csv(String),
            List(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Csv(raw) => AttributeList::from_csv(&raw),
            Raw::List(list) => AttributeList(
                list.iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
        })
    }
}

impl<S: Into<String>> FromIterator<S> for AttributeList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        AttributeList(iter.into_iter().map(Into::into).collect())
    }
}

/// Configuration of one requestable relation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSpec {
    /// Relation name on the entity (defaults to the relation key)
    #[serde(default, alias = "relation_name")]
    pub relation_name: Option<String>,

    /// Output column (defaults to the relation key)
    #[serde(default, alias = "column_name")]
    pub column_name: Option<String>,

    #[serde(default, rename = "return")]
    pub return_mode: ReturnMode,

    /// Attribute used to key collection output
    #[serde(default, alias = "key_field")]
    pub key_field: Option<String>,

    #[serde(default, alias = "safe_attributes")]
    pub safe_attributes: Option<AttributeList>,
}

impl RelationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, name: impl Into<String>) -> Self {
        self.relation_name = Some(name.into());
        self
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column_name = Some(name.into());
        self
    }

    pub fn returning(mut self, mode: ReturnMode) -> Self {
        self.return_mode = mode;
        self
    }

    pub fn keyed_by(mut self, field: impl Into<String>) -> Self {
        self.key_field = Some(field.into());
        self
    }

    pub fn safe_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.safe_attributes = Some(names.into_iter().collect());
        self
    }

    fn filter(&self, object: &Map<String, Value>) -> Map<String, Value> {
        match &self.safe_attributes {
            Some(list) => list.project(object),
            None => object.clone(),
        }
    }
}

/// Relation key -> spec
pub type RelationConfig = IndexMap<String, RelationSpec>;

/// Normalize raw `with` entries into a trimmed, deduplicated key list
pub fn normalize_with(raw: &[String]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for entry in raw {
        for key in entry.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }
    keys
}

/// Resolves the relations requested by one request
#[derive(Debug, Clone)]
pub struct RelationResolver<'a> {
    requested: Vec<(String, &'a RelationSpec)>,
}

impl<'a> RelationResolver<'a> {
    /// Validate the requested keys against the configuration.
    ///
    /// Fails on the first unknown key, before anything is resolved.
    pub fn new(config: &'a RelationConfig, with: &[String]) -> Result<Self, ApiError> {
        let mut requested = Vec::new();
        for key in normalize_with(with) {
            let Some(spec) = config.get(&key) else {
                return Err(ApiError::UnknownRelation { relation: key });
            };
            requested.push((key, spec));
        }
        Ok(Self { requested })
    }

    pub fn is_empty(&self) -> bool {
        self.requested.is_empty()
    }

    /// Relation names the store has to load eagerly
    pub fn relation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (key, spec) in &self.requested {
            let name = spec.relation_name.clone().unwrap_or_else(|| key.clone());
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Output columns for the requested relations of one entity.
    ///
    /// Relations the entity does not declare are skipped.
    pub fn resolve(&self, entity: &dyn Entity) -> Map<String, Value> {
        let declared = entity.relation_names();
        let mut output = Map::new();

        for (key, spec) in &self.requested {
            let relation = spec.relation_name.as_deref().unwrap_or(key);
            if !declared.iter().any(|d| d == relation) {
                continue;
            }
            let column = spec.column_name.clone().unwrap_or_else(|| key.clone());
            let value = match entity.relation(relation) {
                Some(data) => shape(spec, data),
                None => Value::Array(Vec::new()),
            };
            output.insert(column, value);
        }

        output
    }

    /// Entity attributes merged with its resolved relation columns
    pub fn embed(&self, entity: &dyn Entity) -> Value {
        let mut object = attributes_to_json(&entity.attributes());
        object.extend(self.resolve(entity));
        Value::Object(object)
    }
}

fn shape(spec: &RelationSpec, data: &RelatedData) -> Value {
    match data {
        RelatedData::One(entity) => match spec.return_mode {
            ReturnMode::Object => match entity.to_value() {
                Value::Object(object) if spec.safe_attributes.is_some() => {
                    Value::Object(spec.filter(&object))
                }
                other => other,
            },
            ReturnMode::Array => {
                Value::Object(spec.filter(&attributes_to_json(&entity.attributes())))
            }
        },
        RelatedData::Many(entities) => {
            let items = entities
                .iter()
                .map(|e| Value::Object(spec.filter(&attributes_to_json(&e.attributes()))))
                .collect();
            key_items(spec, items)
        }
        RelatedData::Raw(Value::Array(items)) => {
            let items = items
                .iter()
                .map(|item| match item {
                    Value::Object(object) => Value::Object(spec.filter(object)),
                    other => other.clone(),
                })
                .collect();
            key_items(spec, items)
        }
        RelatedData::Raw(Value::Object(object)) => Value::Object(spec.filter(object)),
        RelatedData::Raw(other) => other.clone(),
        RelatedData::Missing => Value::Array(Vec::new()),
    }
}

/// Re-index a collection by the configured key field.
///
/// Items without the field get the next free numeric key.
fn key_items(spec: &RelationSpec, items: Vec<Value>) -> Value {
    let Some(key_field) = &spec.key_field else {
        return Value::Array(items);
    };

    let mut keyed = Map::new();
    let mut next_index: i64 = 0;

    for item in items {
        let key = item.get(key_field).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(true) => Some("1".to_string()),
            _ => None,
        });
        let key = match key {
            Some(key) => {
                if let Ok(n) = key.parse::<i64>() {
                    next_index = next_index.max(n + 1);
                }
                key
            }
            None => {
                let key = next_index.to_string();
                next_index += 1;
                key
            }
        };
        keyed.insert(key, item);
    }

    Value::Object(keyed)
}
