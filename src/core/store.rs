//! Store traits: the persistence seam of controllers
//!
//! A [`Store`] serves one entity type. Controllers only ever talk to stores
//! through this trait, so any backend (SQL, document, in-memory) can sit
//! behind the same REST surface.

use crate::core::criteria::Selection;
use crate::core::entity::{Entity, Scenario};
use crate::core::error::{FieldErrors, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Persistence operations for a single entity type
#[async_trait]
pub trait Store: Send + Sync {
    /// Entity type served by this store
    fn entity_type(&self) -> &str;

    /// Name of the primary identifier attribute
    fn id_field(&self) -> &str {
        "id"
    }

    /// A fresh, unsaved entity in the given scenario
    fn instantiate(&self, scenario: Scenario) -> Box<dyn Entity>;

    /// First row matching the selection, with `selection.with` loaded
    async fn find(&self, selection: &Selection) -> Result<Option<Box<dyn Entity>>, StoreError>;

    /// Rows matching the selection, paginated and ordered
    async fn find_all(&self, selection: &Selection) -> Result<Vec<Box<dyn Entity>>, StoreError>;

    /// Number of rows matching the selection's condition, ignoring pagination
    async fn count(&self, selection: &Selection) -> Result<u64, StoreError>;

    /// Validate an entity against the rules of its current scenario
    async fn validate(&self, entity: &dyn Entity) -> Result<(), FieldErrors>;

    /// Insert a new entity or update a persisted one
    async fn save(&self, entity: &mut dyn Entity) -> Result<(), StoreError>;

    async fn delete(&self, entity: &dyn Entity) -> Result<(), StoreError>;

    /// Save every entity as one unit: either all rows are written or none.
    ///
    /// Stores without transactions keep the default, which saves row by row
    /// and stops at the first failure.
    async fn save_batch(&self, entities: &mut [Box<dyn Entity>]) -> Result<(), StoreError> {
        for entity in entities.iter_mut() {
            self.save(entity.as_mut()).await?;
        }
        Ok(())
    }

    /// Delete every entity as one unit
    async fn delete_batch(&self, entities: &[Box<dyn Entity>]) -> Result<(), StoreError> {
        for entity in entities {
            self.delete(entity.as_ref()).await?;
        }
        Ok(())
    }
}

/// Stores keyed by entity type name
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn Store>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store under its entity type, replacing any previous one
    pub fn register(&mut self, store: Arc<dyn Store>) {
        self.stores.insert(store.entity_type().to_string(), store);
    }

    pub fn get(&self, entity_type: &str) -> Option<Arc<dyn Store>> {
        self.stores.get(entity_type).cloned()
    }

    pub fn entity_types(&self) -> Vec<&str> {
        self.stores.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("entity_types", &self.entity_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Record;

    /// Store that holds nothing and accepts everything
    struct NullStore;

    #[async_trait]
    impl Store for NullStore {
        fn entity_type(&self) -> &str {
            "null"
        }

        fn instantiate(&self, scenario: Scenario) -> Box<dyn Entity> {
            let mut record = Record::new("null", &["id".to_string()]);
            record.set_scenario(scenario);
            Box::new(record)
        }

        async fn find(&self, _: &Selection) -> Result<Option<Box<dyn Entity>>, StoreError> {
            Ok(None)
        }

        async fn find_all(&self, _: &Selection) -> Result<Vec<Box<dyn Entity>>, StoreError> {
            Ok(Vec::new())
        }

        async fn count(&self, _: &Selection) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn validate(&self, _: &dyn Entity) -> Result<(), FieldErrors> {
            Ok(())
        }

        async fn save(&self, _: &mut dyn Entity) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete(&self, _: &dyn Entity) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_default_batches_write_row_by_row() {
        let store = NullStore;
        let mut entities = vec![store.instantiate(Scenario::Create), store.instantiate(Scenario::Create)];
        assert!(tokio_test::block_on(store.save_batch(&mut entities)).is_ok());
        assert!(tokio_test::block_on(store.delete_batch(&entities)).is_ok());
        assert!(tokio_test::block_on(store.delete_batch(&[])).is_ok());
    }

    #[test]
    fn test_registry_keys_by_entity_type() {
        let mut registry = StoreRegistry::new();
        assert!(registry.get("null").is_none());

        registry.register(Arc::new(NullStore));
        let store = registry.get("null").unwrap();
        assert_eq!(store.entity_type(), "null");
        assert_eq!(store.id_field(), "id");
        assert_eq!(registry.entity_types(), vec!["null"]);
    }

    #[test]
    fn test_instantiate_sets_scenario() {
        let entity = NullStore.instantiate(Scenario::Update);
        assert_eq!(entity.scenario(), Scenario::Update);
        assert!(entity.is_new_record());
    }
}
