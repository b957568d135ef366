//! In-memory relational store for testing and development
//!
//! Every table lives behind one `RwLock`. Rows are keyed by an auto-increment
//! integer identifier and always carry exactly the attributes of their schema.
//! Relations are declared per schema and loaded eagerly on request.

use crate::core::criteria::{Condition, Direction, Selection, parse_order};
use crate::core::entity::{Entity, Record, RelatedData, Scenario};
use crate::core::error::{FieldErrors, StoreError};
use crate::core::field::{Attributes, FieldValue};
use crate::core::store::{Store, StoreRegistry};
use crate::core::validation::{Rule, run_rules, validators::label};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
}

/// Relation between two tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub kind: RelationKind,
    /// Entity type of the related table
    pub target: String,
    /// `has_one`/`has_many`: column of the target referencing this row.
    /// `belongs_to`: column of this row referencing the target.
    pub foreign_key: String,
    /// Refuse to delete a row while dependent rows exist
    pub restrict_delete: bool,
}

impl RelationDef {
    fn new(kind: RelationKind, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            foreign_key: foreign_key.into(),
            restrict_delete: false,
        }
    }

    pub fn has_one(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, target, foreign_key)
    }

    pub fn has_many(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, target, foreign_key)
    }

    pub fn belongs_to(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsTo, target, foreign_key)
    }

    pub fn restrict(mut self) -> Self {
        self.restrict_delete = true;
        self
    }
}

/// Table definition: attributes, relations, validation rules and unique columns
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub entity_type: String,
    pub id_field: String,
    pub attributes: Vec<String>,
    pub relations: IndexMap<String, RelationDef>,
    pub rules: Vec<Rule>,
    pub unique: Vec<String>,
}

impl EntitySchema {
    pub fn new<I, S>(entity_type: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity_type: entity_type.into(),
            id_field: "id".to_string(),
            attributes: attributes.into_iter().map(Into::into).collect(),
            relations: IndexMap::new(),
            rules: Vec::new(),
            unique: Vec::new(),
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn relation(mut self, name: impl Into<String>, def: RelationDef) -> Self {
        self.relations.insert(name.into(), def);
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Values of this attribute must be unique across the table
    pub fn unique(mut self, attribute: impl Into<String>) -> Self {
        self.unique.push(attribute.into());
        self
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    fn ensure_id(mut self) -> Self {
        if !self.has_attribute(&self.id_field) {
            self.attributes.insert(0, self.id_field.clone());
        }
        self
    }

    fn relation_names(&self) -> Vec<String> {
        self.relations.keys().cloned().collect()
    }

    fn blank_record(&self) -> Record {
        Record::new(self.entity_type.clone(), &self.attributes)
            .with_id_field(self.id_field.clone())
            .with_relation_names(self.relation_names())
    }

    fn record(&self, row: Attributes) -> Record {
        Record::loaded(self.entity_type.clone(), row)
            .with_id_field(self.id_field.clone())
            .with_relation_names(self.relation_names())
    }

    /// Row holding exactly the schema's attributes, missing ones as null
    fn normalize(&self, values: &Attributes) -> Attributes {
        self.attributes
            .iter()
            .map(|name| (name.clone(), values.get(name).cloned().unwrap_or_default()))
            .collect()
    }
}

// =============================================================================
// Tables
// =============================================================================

struct Table {
    schema: Arc<EntitySchema>,
    rows: BTreeMap<i64, Attributes>,
    next_id: i64,
}

impl Table {
    fn new(schema: Arc<EntitySchema>) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn check_attributes<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<(), StoreError> {
        for name in names {
            if !self.schema.has_attribute(name) {
                return Err(StoreError::UnknownAttribute(name.to_string()));
            }
        }
        Ok(())
    }

    fn matching(&self, condition: Option<&Condition>) -> Result<Vec<&Attributes>, StoreError> {
        let Some(condition) = condition else {
            return Ok(self.rows.values().collect());
        };
        self.check_attributes(condition.attributes())?;
        Ok(self.rows.values().filter(|row| condition.matches(row)).collect())
    }

    fn select(&self, selection: &Selection) -> Result<Vec<&Attributes>, StoreError> {
        let terms = parse_order(&selection.order)
            .ok_or_else(|| StoreError::InvalidOrder(selection.order.clone()))?;
        self.check_attributes(terms.iter().map(|(name, _)| name.as_str()))?;

        let mut rows = self.matching(selection.condition.as_ref())?;
        rows.sort_by(|a, b| compare_rows(a, b, &terms));

        let rows = rows
            .into_iter()
            .skip(usize::try_from(selection.start()).unwrap_or(0));
        Ok(match usize::try_from(selection.limit) {
            Ok(limit) => rows.take(limit).collect(),
            Err(_) => rows.collect(),
        })
    }

    /// Unique columns of `row` already taken by another row
    fn unique_violations(&self, row: &Attributes, own_id: Option<i64>) -> Vec<(String, String)> {
        let mut violations = Vec::new();
        for attribute in &self.schema.unique {
            let Some(value) = row.get(attribute).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = self.rows.iter().any(|(id, other)| {
                Some(*id) != own_id && other.get(attribute).is_some_and(|v| v.loose_eq(value))
            });
            if taken {
                violations.push((
                    attribute.clone(),
                    format!("{} \"{}\" has already been taken.", label(attribute), value.to_text()),
                ));
            }
        }
        violations
    }

    fn check_unique(&self, row: &Attributes, own_id: Option<i64>) -> Result<(), StoreError> {
        match self.unique_violations(row, own_id).into_iter().next() {
            Some((attribute, message)) => Err(StoreError::Constraint { attribute, message }),
            None => Ok(()),
        }
    }

    /// Insert a row, assigning the next identifier when it has none
    fn insert(&mut self, values: &Attributes) -> Result<(i64, Attributes), StoreError> {
        let id_field = self.schema.id_field.clone();
        let mut row = self.schema.normalize(values);

        let id = match row.get(&id_field) {
            None | Some(FieldValue::Null) => self.next_id,
            Some(value) => row_key(value).ok_or_else(|| StoreError::Constraint {
                attribute: id_field.clone(),
                message: format!("{} must be an integer.", label(&id_field)),
            })?,
        };
        if self.rows.contains_key(&id) {
            return Err(StoreError::Constraint {
                attribute: id_field.clone(),
                message: format!("{} \"{}\" has already been taken.", label(&id_field), id),
            });
        }
        self.check_unique(&row, None)?;

        row.insert(id_field, FieldValue::Integer(id));
        self.rows.insert(id, row.clone());
        self.next_id = self.next_id.max(id + 1);
        Ok((id, row))
    }
}

fn row_key(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Integer(i) => Some(*i),
        FieldValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_values(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .loose_cmp(b)
            .unwrap_or_else(|| a.to_text().cmp(&b.to_text())),
    }
}

fn compare_rows(a: &Attributes, b: &Attributes, terms: &[(String, Direction)]) -> Ordering {
    for (attribute, direction) in terms {
        let ordering = compare_values(a.get(attribute), b.get(attribute));
        let ordering = match direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

// =============================================================================
// Database
// =============================================================================

/// One row written by a batch, with the row it replaced
struct JournalEntry {
    id: i64,
    previous: Option<Attributes>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
}

impl State {
    fn table(&self, entity_type: &str) -> Result<&Table, StoreError> {
        self.tables
            .get(entity_type)
            .ok_or_else(|| StoreError::UnknownEntity(entity_type.to_string()))
    }

    fn table_mut(&mut self, entity_type: &str) -> Result<&mut Table, StoreError> {
        self.tables
            .get_mut(entity_type)
            .ok_or_else(|| StoreError::UnknownEntity(entity_type.to_string()))
    }

    fn undo(&mut self, entity_type: &str, journal: Vec<JournalEntry>) {
        let Some(table) = self.tables.get_mut(entity_type) else {
            return;
        };
        for entry in journal.into_iter().rev() {
            match entry.previous {
                Some(row) => {
                    table.rows.insert(entry.id, row);
                }
                None => {
                    table.rows.remove(&entry.id);
                }
            }
        }
    }

    /// Build an entity from a row and load the requested relations
    fn hydrate(&self, table: &Table, row: &Attributes, with: &[String]) -> Result<Box<dyn Entity>, StoreError> {
        let mut record = table.schema.record(row.clone());
        for name in with {
            if let Some(def) = table.schema.relations.get(name) {
                record.set_relation(name, self.related(&table.schema, def, row)?);
            }
        }
        Ok(Box::new(record))
    }

    fn related(&self, schema: &EntitySchema, def: &RelationDef, row: &Attributes) -> Result<RelatedData, StoreError> {
        let target = self.table(&def.target)?;

        let (key, column) = match def.kind {
            RelationKind::BelongsTo => (row.get(&def.foreign_key), &target.schema.id_field),
            RelationKind::HasOne | RelationKind::HasMany => {
                (row.get(&schema.id_field), &def.foreign_key)
            }
        };
        let key = key.cloned().unwrap_or_default();

        let mut records = target
            .rows
            .values()
            .filter(|candidate| candidate.get(column).is_some_and(|v| v.loose_eq(&key)))
            .map(|candidate| Box::new(target.schema.record(candidate.clone())) as Box<dyn Entity>);

        Ok(match def.kind {
            RelationKind::HasMany => RelatedData::Many(records.collect()),
            RelationKind::HasOne | RelationKind::BelongsTo => {
                records.next().map(RelatedData::One).unwrap_or(RelatedData::Missing)
            }
        })
    }

    /// Name of the first restricting relation with dependent rows
    fn blocking_relation(&self, schema: &EntitySchema, row: &Attributes) -> Result<Option<(String, String)>, StoreError> {
        let key = row.get(&schema.id_field).cloned().unwrap_or_default();
        for (name, def) in &schema.relations {
            if !def.restrict_delete || def.kind == RelationKind::BelongsTo {
                continue;
            }
            let target = self.table(&def.target)?;
            let has_dependents = target
                .rows
                .values()
                .any(|r| r.get(&def.foreign_key).is_some_and(|v| v.loose_eq(&key)));
            if has_dependents {
                return Ok(Some((name.clone(), def.target.clone())));
            }
        }
        Ok(None)
    }
}

/// Shared in-memory database
///
/// Cloning is cheap and every clone sees the same tables.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    state: Arc<RwLock<State>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|e| StoreError::Backend(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|e| StoreError::Backend(format!("Failed to acquire write lock: {}", e)))
    }

    /// Create (or replace) a table and return its store
    pub fn define(&self, schema: EntitySchema) -> Result<InMemoryStore, StoreError> {
        let schema = Arc::new(schema.ensure_id());
        tracing::debug!(
            entity_type = %schema.entity_type,
            attributes = ?schema.attributes,
            "Defining in-memory table"
        );
        self.write()?
            .tables
            .insert(schema.entity_type.clone(), Table::new(schema.clone()));
        Ok(InMemoryStore {
            db: self.clone(),
            schema,
        })
    }

    /// Store of an existing table
    pub fn store(&self, entity_type: &str) -> Result<InMemoryStore, StoreError> {
        let schema = self.read()?.table(entity_type)?.schema.clone();
        Ok(InMemoryStore {
            db: self.clone(),
            schema,
        })
    }

    /// Store registry with one store per table
    pub fn registry(&self) -> Result<StoreRegistry, StoreError> {
        let schemas: Vec<Arc<EntitySchema>> =
            self.read()?.tables.values().map(|t| t.schema.clone()).collect();

        let mut registry = StoreRegistry::new();
        for schema in schemas {
            registry.register(Arc::new(InMemoryStore {
                db: self.clone(),
                schema,
            }));
        }
        Ok(registry)
    }

    /// Insert a row directly, without validation. Returns its identifier.
    pub fn insert(&self, entity_type: &str, row: Attributes) -> Result<i64, StoreError> {
        let (id, _) = self.write()?.table_mut(entity_type)?.insert(&row)?;
        Ok(id)
    }

    /// Every row of a table in identifier order
    pub fn rows(&self, entity_type: &str) -> Result<Vec<Attributes>, StoreError> {
        Ok(self.read()?.table(entity_type)?.rows.values().cloned().collect())
    }
}

// =============================================================================
// Store
// =============================================================================

/// [`Store`] over one table of an [`InMemoryDatabase`]
#[derive(Clone)]
pub struct InMemoryStore {
    db: InMemoryDatabase,
    schema: Arc<EntitySchema>,
}

impl InMemoryStore {
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    fn missing(&self, entity: &dyn Entity) -> StoreError {
        StoreError::Missing {
            entity_type: self.schema.entity_type.clone(),
            id: entity.id().map(|v| v.to_text()).unwrap_or_default(),
        }
    }

    /// Insert or update one row under an already held write lock
    fn write_row(&self, state: &mut State, entity: &mut dyn Entity) -> Result<JournalEntry, StoreError> {
        let entity_type = self.schema.entity_type.as_str();
        let id_field = self.schema.id_field.as_str();

        if entity.is_new_record() {
            let (id, _) = state.table_mut(entity_type)?.insert(&entity.attributes())?;

            entity.set(id_field, FieldValue::Integer(id));
            entity.set_new_record(false);
            entity.set_scenario(Scenario::Update);
            tracing::debug!(entity_type, id, "Inserted row");
            return Ok(JournalEntry { id, previous: None });
        }

        let id = entity
            .id()
            .and_then(|v| row_key(&v))
            .ok_or_else(|| self.missing(entity))?;
        let table = state.table_mut(entity_type)?;
        let previous = table.rows.get(&id).cloned().ok_or_else(|| self.missing(entity))?;

        let mut row = table.schema.normalize(&entity.attributes());
        row.insert(id_field.to_string(), FieldValue::Integer(id));
        table.check_unique(&row, Some(id))?;
        table.rows.insert(id, row);

        tracing::debug!(entity_type, id, "Updated row");
        Ok(JournalEntry {
            id,
            previous: Some(previous),
        })
    }

    /// Delete one row under an already held write lock
    fn remove_row(&self, state: &mut State, entity: &dyn Entity) -> Result<JournalEntry, StoreError> {
        let entity_type = self.schema.entity_type.as_str();

        let id = entity
            .id()
            .and_then(|v| row_key(&v))
            .ok_or_else(|| self.missing(entity))?;
        let row = state
            .table(entity_type)?
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| self.missing(entity))?;

        if let Some((relation, target)) = state.blocking_relation(&self.schema, &row)? {
            return Err(StoreError::Constraint {
                attribute: relation,
                message: format!("Cannot delete {} while related {} rows exist.", entity_type, target),
            });
        }

        state.table_mut(entity_type)?.rows.remove(&id);
        tracing::debug!(entity_type, id, "Deleted row");
        Ok(JournalEntry {
            id,
            previous: Some(row),
        })
    }

    /// Undo the rows a failed batch already wrote
    fn roll_back(&self, state: &mut State, journal: Vec<JournalEntry>, error: &StoreError) {
        tracing::warn!(
            entity_type = %self.schema.entity_type,
            writes = journal.len(),
            error = %error,
            "Rolling back batch"
        );
        state.undo(&self.schema.entity_type, journal);
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("entity_type", &self.schema.entity_type)
            .finish()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn entity_type(&self) -> &str {
        &self.schema.entity_type
    }

    fn id_field(&self) -> &str {
        &self.schema.id_field
    }

    fn instantiate(&self, scenario: Scenario) -> Box<dyn Entity> {
        let mut record = self.schema.blank_record();
        record.set_scenario(scenario);
        Box::new(record)
    }

    async fn find(&self, selection: &Selection) -> Result<Option<Box<dyn Entity>>, StoreError> {
        let mut first = selection.clone();
        first.limit = 1;
        Ok(self.find_all(&first).await?.into_iter().next())
    }

    async fn find_all(&self, selection: &Selection) -> Result<Vec<Box<dyn Entity>>, StoreError> {
        let state = self.db.read()?;
        let table = state.table(&self.schema.entity_type)?;
        table
            .select(selection)?
            .into_iter()
            .map(|row| state.hydrate(table, row, &selection.with))
            .collect()
    }

    async fn count(&self, selection: &Selection) -> Result<u64, StoreError> {
        let state = self.db.read()?;
        let table = state.table(&self.schema.entity_type)?;
        Ok(table.matching(selection.condition.as_ref())?.len() as u64)
    }

    async fn validate(&self, entity: &dyn Entity) -> Result<(), FieldErrors> {
        let mut errors = run_rules(&self.schema.rules, entity);

        let own_id = if entity.is_new_record() {
            None
        } else {
            entity.id().and_then(|v| row_key(&v))
        };
        match self.db.read() {
            Ok(state) => {
                if let Ok(table) = state.table(&self.schema.entity_type) {
                    for (attribute, message) in table.unique_violations(&entity.attributes(), own_id) {
                        errors.entry(attribute).or_default().push(message);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Skipping uniqueness validation"),
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    async fn save(&self, entity: &mut dyn Entity) -> Result<(), StoreError> {
        let mut state = self.db.write()?;
        self.write_row(&mut state, entity).map(|_| ())
    }

    async fn delete(&self, entity: &dyn Entity) -> Result<(), StoreError> {
        let mut state = self.db.write()?;
        self.remove_row(&mut state, entity).map(|_| ())
    }

    async fn save_batch(&self, entities: &mut [Box<dyn Entity>]) -> Result<(), StoreError> {
        let mut state = self.db.write()?;
        let mut journal = Vec::with_capacity(entities.len());
        for entity in entities.iter_mut() {
            match self.write_row(&mut state, entity.as_mut()) {
                Ok(entry) => journal.push(entry),
                Err(e) => {
                    self.roll_back(&mut state, journal, &e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn delete_batch(&self, entities: &[Box<dyn Entity>]) -> Result<(), StoreError> {
        let mut state = self.db.write()?;
        let mut journal = Vec::with_capacity(entities.len());
        for entity in entities {
            match self.remove_row(&mut state, entity.as_ref()) {
                Ok(entry) => journal.push(entry),
                Err(e) => {
                    self.roll_back(&mut state, journal, &e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
