//! Entity capability trait and the generic `Record` implementation
//!
//! Controllers never know the concrete type they serve. Every record is handled
//! through the [`Entity`] trait: attribute access by name, mass assignment,
//! scenario selection and access to eagerly loaded relations.

use crate::core::field::{Attributes, FieldValue, attributes_to_json};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;

/// Validation scenario of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scenario {
    #[default]
    Create,
    Update,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Create => "create",
            Scenario::Update => "update",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data attached to a record under a relation name
#[derive(Debug, Clone)]
pub enum RelatedData {
    /// A single related record (`has_one`, `belongs_to`)
    One(Box<dyn Entity>),
    /// A list of related records (`has_many`)
    Many(Vec<Box<dyn Entity>>),
    /// Raw nested data that is not backed by records
    Raw(Value),
    /// The relation was loaded and is empty
    Missing,
}

/// Capability trait implemented by every record type served by a controller
pub trait Entity: fmt::Debug + Send + Sync {
    /// Entity type name (e.g. "user")
    fn entity_type(&self) -> &str;

    /// Name of the primary identifier attribute
    fn id_field(&self) -> &str {
        "id"
    }

    /// Declared attribute names, in column order
    fn attribute_names(&self) -> Vec<String>;

    /// Get the value of an attribute
    fn get(&self, name: &str) -> Option<FieldValue>;

    /// Set the value of an attribute
    fn set(&mut self, name: &str, value: FieldValue);

    fn scenario(&self) -> Scenario;

    fn set_scenario(&mut self, scenario: Scenario);

    /// Whether the record has never been persisted
    fn is_new_record(&self) -> bool;

    fn set_new_record(&mut self, new_record: bool);

    /// Names of the relations this entity type declares
    fn relation_names(&self) -> Vec<String>;

    /// Loaded data of a relation, if it was eagerly loaded
    fn relation(&self, name: &str) -> Option<&RelatedData>;

    fn set_relation(&mut self, name: &str, data: RelatedData);

    fn clone_box(&self) -> Box<dyn Entity>;

    /// Current identifier value, `None` while unset
    fn id(&self) -> Option<FieldValue> {
        self.get(self.id_field()).filter(|v| !v.is_null())
    }

    /// All declared attributes with their current values
    fn attributes(&self) -> Attributes {
        self.attribute_names()
            .into_iter()
            .map(|name| {
                let value = self.get(&name).unwrap_or_default();
                (name, value)
            })
            .collect()
    }

    /// Mass-assign client data.
    ///
    /// Only declared attributes are assigned and the identifier is never
    /// overwritten.
    fn assign(&mut self, data: &Map<String, Value>) {
        let id_field = self.id_field().to_string();
        for name in self.attribute_names() {
            if name == id_field {
                continue;
            }
            if let Some(value) = data.get(&name) {
                self.set(&name, FieldValue::from_json(value));
            }
        }
    }

    /// Attributes plus every loaded relation, as JSON
    fn to_value(&self) -> Value {
        let mut object = attributes_to_json(&self.attributes());
        for name in self.relation_names() {
            if let Some(data) = self.relation(&name) {
                object.insert(name, data.to_value());
            }
        }
        Value::Object(object)
    }
}

impl Clone for Box<dyn Entity> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl RelatedData {
    /// Full JSON representation of the loaded data
    pub fn to_value(&self) -> Value {
        match self {
            RelatedData::One(entity) => entity.to_value(),
            RelatedData::Many(entities) => {
                Value::Array(entities.iter().map(|e| e.to_value()).collect())
            }
            RelatedData::Raw(value) => value.clone(),
            RelatedData::Missing => Value::Array(Vec::new()),
        }
    }
}

/// Generic attribute-map backed entity
///
/// Storage backends hand out `Record`s built from their schema. Applications
/// with hand-written entity types implement [`Entity`] directly instead.
#[derive(Debug, Clone)]
pub struct Record {
    entity_type: String,
    id_field: String,
    attributes: Attributes,
    relation_names: Vec<String>,
    relations: IndexMap<String, RelatedData>,
    scenario: Scenario,
    new_record: bool,
}

impl Record {
    /// Create a new, unsaved record with every attribute set to null
    pub fn new(entity_type: impl Into<String>, attribute_names: &[String]) -> Self {
        Self {
            entity_type: entity_type.into(),
            id_field: "id".to_string(),
            attributes: attribute_names
                .iter()
                .map(|name| (name.clone(), FieldValue::Null))
                .collect(),
            relation_names: Vec::new(),
            relations: IndexMap::new(),
            scenario: Scenario::Create,
            new_record: true,
        }
    }

    /// Build a persisted record from stored attributes
    pub fn loaded(entity_type: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            entity_type: entity_type.into(),
            id_field: "id".to_string(),
            attributes,
            relation_names: Vec::new(),
            relations: IndexMap::new(),
            scenario: Scenario::Update,
            new_record: false,
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_relation_names(mut self, names: Vec<String>) -> Self {
        self.relation_names = names;
        self
    }
}

impl Entity for Record {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn id_field(&self) -> &str {
        &self.id_field
    }

    fn attribute_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<FieldValue> {
        self.attributes.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: FieldValue) {
        self.attributes.insert(name.to_string(), value);
    }

    fn scenario(&self) -> Scenario {
        self.scenario
    }

    fn set_scenario(&mut self, scenario: Scenario) {
        self.scenario = scenario;
    }

    fn is_new_record(&self) -> bool {
        self.new_record
    }

    fn set_new_record(&mut self, new_record: bool) {
        self.new_record = new_record;
    }

    fn relation_names(&self) -> Vec<String> {
        self.relation_names.clone()
    }

    fn relation(&self, name: &str) -> Option<&RelatedData> {
        self.relations.get(name)
    }

    fn set_relation(&mut self, name: &str, data: RelatedData) {
        self.relations.insert(name.to_string(), data);
    }

    fn clone_box(&self) -> Box<dyn Entity> {
        Box::new(self.clone())
    }

    fn attributes(&self) -> Attributes {
        self.attributes.clone()
    }
}
