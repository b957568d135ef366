//! CRUD orchestrator
//!
//! An [`ApiController`] serves one route. It is configured with a store
//! binding, a relation configuration, a base condition, an allow-list of
//! response attributes and server-asserted priority data. Every operation walks
//! the same path (resolve targets, validate, persist, respond) and returns an
//! [`OperationResult`]; failures never escape as errors.

use crate::config::ControllerConfig;
use crate::core::criteria::{
    Condition, CriteriaDefaults, Selection, build_selection, lookup_selection,
};
use crate::core::entity::{Entity, Scenario};
use crate::core::error::{ApiError, FieldErrors, ValidationFailure};
use crate::core::field::attributes_to_json;
use crate::core::relations::{AttributeList, RelationConfig, RelationResolver, RelationSpec, normalize_with};
use crate::core::request::{RequestContext, Verb};
use crate::core::resolve::{Lookup, TargetPlan, merge_priority, plan_creation, plan_lookups};
use crate::core::response::{self, ContentRange, OperationResult};
use crate::core::store::{Store, StoreRegistry};
use axum::http::header;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a request may proceed
pub type AccessCheck = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Target loaded for an update or a delete, with its input element
struct LoadedTarget<'p> {
    position: usize,
    data: &'p Map<String, Value>,
    entity: Box<dyn Entity>,
}

/// REST controller for one entity type
#[derive(Clone)]
pub struct ApiController {
    name: String,
    entity_type: String,
    store: Option<Arc<dyn Store>>,
    relations: RelationConfig,
    base: Option<Condition>,
    safe_attributes: AttributeList,
    priority_data: Map<String, Value>,
    defaults: CriteriaDefaults,
    access_check: Option<AccessCheck>,
    atomic_batches: bool,
}

impl ApiController {
    /// Controller named `name` serving the entity type of `store`
    pub fn new(name: impl Into<String>, store: Arc<dyn Store>) -> Self {
        let entity_type = store.entity_type().to_string();
        Self {
            store: Some(store),
            ..Self::unbound(name, entity_type)
        }
    }

    /// Controller without a store binding. Every store-backed operation
    /// answers with a configuration error.
    pub fn unbound(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            store: None,
            relations: RelationConfig::new(),
            base: None,
            safe_attributes: AttributeList::default(),
            priority_data: Map::new(),
            defaults: CriteriaDefaults::default(),
            access_check: None,
            atomic_batches: true,
        }
    }

    /// Build a controller from configuration, binding the store of its entity type
    pub fn from_config(config: &ControllerConfig, stores: &StoreRegistry) -> Self {
        let mut controller = match stores.get(&config.entity) {
            Some(store) => Self::new(config.name.clone(), store),
            None => {
                tracing::warn!(
                    controller = %config.name,
                    entity_type = %config.entity,
                    "No store registered for controller entity type"
                );
                Self::unbound(config.name.clone(), config.entity.clone())
            }
        };

        controller.relations = config.relations.clone();
        controller.base = config.base_condition();
        controller.safe_attributes = config.safe_attributes.clone().unwrap_or_default();
        controller.priority_data = config.priority_data.clone();
        controller.defaults = config.defaults();
        controller.atomic_batches = config.atomic_batches;
        controller
    }

    pub fn with_relation(mut self, key: impl Into<String>, spec: RelationSpec) -> Self {
        self.relations.insert(key.into(), spec);
        self
    }

    pub fn with_relations(mut self, relations: RelationConfig) -> Self {
        self.relations = relations;
        self
    }

    /// Condition ANDed into every selection of this controller
    pub fn with_base_condition(mut self, condition: Condition) -> Self {
        self.base = Some(condition);
        self
    }

    pub fn with_safe_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.safe_attributes = names.into_iter().collect();
        self
    }

    /// Attributes forced onto every created or updated entity
    pub fn with_priority_data(mut self, data: Map<String, Value>) -> Self {
        self.priority_data = data;
        self
    }

    pub fn with_defaults(mut self, defaults: CriteriaDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_access_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.access_check = Some(Arc::new(check));
        self
    }

    /// Run multi-row writes inside store batches (enabled by default)
    pub fn with_atomic_batches(mut self, atomic: bool) -> Self {
        self.atomic_batches = atomic;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn id_field(&self) -> &str {
        self.store.as_ref().map(|s| s.id_field()).unwrap_or("id")
    }

    /// The fixed 403 result
    pub fn access_denied() -> OperationResult {
        response::access_denied()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatch a request by verb.
    ///
    /// `GET` with a path identifier views one entity, `GET` without lists.
    pub async fn handle(&self, ctx: &RequestContext) -> OperationResult {
        if let Some(check) = &self.access_check {
            if !check(ctx) {
                tracing::warn!(controller = %self.name, verb = %ctx.verb, "Access denied");
                return Self::access_denied();
            }
        }

        tracing::debug!(
            controller = %self.name,
            verb = %ctx.verb,
            id = ?ctx.id,
            "Handling request"
        );

        let result = match ctx.verb {
            Verb::Get if ctx.id.is_some() => self.view(ctx).await,
            Verb::Get => self.list(ctx).await,
            Verb::Post => self.create(ctx).await,
            Verb::Put => self.update(ctx).await,
            Verb::Delete => self.delete(ctx).await,
        };

        tracing::debug!(controller = %self.name, status = %result.status, "Request handled");
        result
    }

    pub async fn view(&self, ctx: &RequestContext) -> OperationResult {
        self.respond(self.try_view(ctx).await)
    }

    pub async fn list(&self, ctx: &RequestContext) -> OperationResult {
        self.respond(self.try_list(ctx).await)
    }

    pub async fn create(&self, ctx: &RequestContext) -> OperationResult {
        self.respond(self.try_create(ctx).await)
    }

    pub async fn update(&self, ctx: &RequestContext) -> OperationResult {
        self.respond(self.try_update(ctx).await)
    }

    pub async fn delete(&self, ctx: &RequestContext) -> OperationResult {
        self.respond(self.try_delete(ctx).await)
    }

    fn respond(&self, result: Result<OperationResult, ApiError>) -> OperationResult {
        match result {
            Ok(result) => result.shaped(&self.safe_attributes),
            Err(error) => {
                tracing::warn!(
                    controller = %self.name,
                    status = %error.status_code(),
                    code = error.error_code(),
                    error = %error,
                    "Operation failed"
                );
                OperationResult::from_error(&error)
            }
        }
    }

    fn store(&self) -> Result<&Arc<dyn Store>, ApiError> {
        self.store.as_ref().ok_or_else(|| ApiError::Configuration {
            message: format!("no store bound for entity type '{}'", self.entity_type),
        })
    }

    // =========================================================================
    // Operations
    // =========================================================================

    async fn try_view(&self, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        let store = self.store()?;
        let id = ctx.request_id().ok_or(ApiError::NotFound)?;

        let selection = Selection::by_id(store.id_field(), id, self.base.as_ref())
            .with_relations(self.eager_relations(&ctx.params.with));
        let entity = store.find(&selection).await?.ok_or(ApiError::NotFound)?;

        let resolver = RelationResolver::new(&self.relations, &ctx.params.with)?;
        Ok(OperationResult::ok(resolver.embed(entity.as_ref())))
    }

    async fn try_list(&self, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        let store = self.store()?;
        let resolver = RelationResolver::new(&self.relations, &ctx.params.with)?;

        let selection = build_selection(
            &ctx.params,
            &self.defaults,
            store.id_field(),
            self.base.as_ref(),
        )
        .with_relations(resolver.relation_names());
        tracing::debug!(
            entity_type = %self.entity_type,
            condition = %selection.condition.as_ref().map(|c| c.to_string()).unwrap_or_default(),
            limit = selection.limit,
            offset = selection.offset,
            "Listing rows"
        );

        let rows = store.find_all(&selection).await?;
        let total = store.count(&selection).await?;

        let payload = Value::Array(rows.iter().map(|row| resolver.embed(row.as_ref())).collect());
        let range = ContentRange::compute(
            i64::try_from(total).unwrap_or(i64::MAX),
            selection.offset,
            selection.limit,
        );
        Ok(OperationResult::ok(payload).with_header(header::CONTENT_RANGE, range.to_string()))
    }

    async fn try_create(&self, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        if !ctx.has_data() {
            return Err(ApiError::EmptyBody);
        }
        let store = self.store()?;
        let plan = plan_creation(ctx);

        let mut entities = Vec::with_capacity(plan.targets.len());
        let mut failures = IndexMap::new();
        for target in &plan.targets {
            let mut entity = store.instantiate(Scenario::Create);
            entity.assign(&merge_priority(&target.data, &self.priority_data));
            if let Err(errors) = store.validate(entity.as_ref()).await {
                failures.insert(target.position, errors);
            }
            entities.push(entity);
        }

        if !failures.is_empty() {
            return Err(ApiError::Validation(validation_failure(&plan, failures)));
        }

        self.persist(store.as_ref(), &mut entities).await?;
        tracing::debug!(entity_type = %self.entity_type, targets = entities.len(), "Created rows");
        Ok(OperationResult::ok(render_rows(&entities, plan.list_result)))
    }

    async fn try_update(&self, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        if !ctx.has_data() {
            return Err(ApiError::EmptyBody);
        }
        let store = self.store()?;
        let plan = plan_lookups(ctx, store.id_field());
        let targets = self.load_targets(store.as_ref(), ctx, &plan).await?;
        if targets.is_empty() {
            return Err(ApiError::NotFound);
        }

        let mut entities = Vec::with_capacity(targets.len());
        let mut failures: IndexMap<usize, FieldErrors> = IndexMap::new();
        for (index, target) in targets.into_iter().enumerate() {
            let LoadedTarget {
                position,
                data,
                mut entity,
            } = target;
            entity.set_scenario(Scenario::Update);
            entity.assign(&merge_priority(data, &self.priority_data));

            if let Err(errors) = store.validate(entity.as_ref()).await {
                let key = if plan.collection { position } else { index };
                let slot = failures.entry(key).or_default();
                for (attribute, messages) in errors {
                    slot.entry(attribute).or_default().extend(messages);
                }
            }
            entities.push(entity);
        }

        if !failures.is_empty() {
            return Err(ApiError::Validation(validation_failure(&plan, failures)));
        }

        self.persist(store.as_ref(), &mut entities).await?;
        tracing::debug!(entity_type = %self.entity_type, targets = entities.len(), "Updated rows");
        Ok(OperationResult::ok(render_rows(&entities, plan.list_result)))
    }

    async fn try_delete(&self, ctx: &RequestContext) -> Result<OperationResult, ApiError> {
        let store = self.store()?;
        let plan = plan_lookups(ctx, store.id_field());
        let entities: Vec<Box<dyn Entity>> = self
            .load_targets(store.as_ref(), ctx, &plan)
            .await?
            .into_iter()
            .map(|target| target.entity)
            .collect();
        if entities.is_empty() {
            return Err(ApiError::NotFound);
        }

        if self.atomic_batches {
            store.delete_batch(&entities).await?;
        } else {
            for entity in &entities {
                store.delete(entity.as_ref()).await?;
            }
        }

        tracing::debug!(entity_type = %self.entity_type, targets = entities.len(), "Deleted rows");
        Ok(OperationResult::ok(render_rows(&entities, entities.len() != 1)))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Relation names to load eagerly for the configured keys among `with`
    fn eager_relations(&self, with: &[String]) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for key in normalize_with(with) {
            if let Some(spec) = self.relations.get(&key) {
                let name = spec.relation_name.clone().unwrap_or(key);
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Load the rows of every planned target.
    ///
    /// A target addressed by identifier must exist; criteria targets may match
    /// any number of rows. A row matched by several targets is kept once, with
    /// the first target that claimed it.
    async fn load_targets<'p>(
        &self,
        store: &dyn Store,
        ctx: &RequestContext,
        plan: &'p TargetPlan<Lookup>,
    ) -> Result<Vec<LoadedTarget<'p>>, ApiError> {
        let id_field = store.id_field();
        let mut loaded = Vec::new();
        let mut claimed = HashSet::new();

        for target in &plan.targets {
            let found = match &target.lookup {
                Lookup::Id(id) => {
                    let selection = Selection::by_id(id_field, id, self.base.as_ref());
                    vec![store.find(&selection).await?.ok_or(ApiError::NotFound)?]
                }
                Lookup::Criteria => {
                    let selection = lookup_selection(&ctx.params, id_field, self.base.as_ref());
                    store.find_all(&selection).await?
                }
            };

            for entity in found {
                if entity.id().is_none_or(|id| claimed.insert(id.to_text())) {
                    loaded.push(LoadedTarget {
                        position: target.position,
                        data: &target.data,
                        entity,
                    });
                }
            }
        }

        Ok(loaded)
    }

    /// Save every entity; with atomic batches the first failure undoes the rest
    async fn persist(&self, store: &dyn Store, entities: &mut [Box<dyn Entity>]) -> Result<(), ApiError> {
        if self.atomic_batches {
            store.save_batch(entities).await?;
        } else {
            for entity in entities.iter_mut() {
                store.save(entity.as_mut()).await?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ApiController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiController")
            .field("name", &self.name)
            .field("entity_type", &self.entity_type)
            .field("bound", &self.store.is_some())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("base", &self.base)
            .field("safe_attributes", &self.safe_attributes)
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Errors of a single target stay flat; several targets are keyed by position
fn validation_failure<L>(plan: &TargetPlan<L>, failures: IndexMap<usize, FieldErrors>) -> ValidationFailure {
    if plan.collection || plan.list_result {
        ValidationFailure::Batch(failures)
    } else {
        ValidationFailure::Single(failures.into_values().next().unwrap_or_default())
    }
}

fn render_rows(entities: &[Box<dyn Entity>], as_list: bool) -> Value {
    let mut rows = entities
        .iter()
        .map(|entity| Value::Object(attributes_to_json(&entity.attributes())));
    if as_list {
        Value::Array(rows.collect())
    } else {
        rows.next().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ACCESS_DENIED_MESSAGE, WRONG_MODEL_MESSAGE};
    use crate::core::relations::ReturnMode;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_unbound_controller_reports_configuration_error() {
        let controller = ApiController::unbound("users", "user");
        let result = controller.handle(&RequestContext::new(Verb::Get)).await;
        assert_eq!(result.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(result.payload, json!({"error": [WRONG_MODEL_MESSAGE]}));
    }

    #[tokio::test]
    async fn test_empty_body_is_checked_before_the_store() {
        let controller = ApiController::unbound("users", "user");
        let result = controller.handle(&RequestContext::new(Verb::Post)).await;
        assert_eq!(result.status, StatusCode::BAD_REQUEST);
        assert_eq!(result.payload, json!({"error": "Data is not received."}));
    }

    #[tokio::test]
    async fn test_access_check_short_circuits() {
        let controller = ApiController::unbound("users", "user").with_access_check(|ctx| ctx.verb == Verb::Get);
        let result = controller.handle(&RequestContext::new(Verb::Delete).with_id("1")).await;
        assert_eq!(result.status, StatusCode::FORBIDDEN);
        assert_eq!(result.payload, json!({"error": {"access": ACCESS_DENIED_MESSAGE}}));
    }

    #[test]
    fn test_eager_relations_map_keys_to_relation_names() {
        let controller = ApiController::unbound("users", "user")
            .with_relation("comments", RelationSpec::new())
            .with_relation("posts", RelationSpec::new().relation("comments").returning(ReturnMode::Array));
        assert_eq!(
            controller.eager_relations(&["comments, posts".to_string(), "unknown".to_string()]),
            vec!["comments".to_string()]
        );
    }

    #[test]
    fn test_validation_failure_shape() {
        let mut failures = IndexMap::new();
        failures.insert(1, FieldErrors::new());

        let single = TargetPlan::<()> {
            targets: Vec::new(),
            collection: false,
            list_result: false,
        };
        assert!(matches!(validation_failure(&single, failures.clone()), ValidationFailure::Single(_)));

        let batch = TargetPlan {
            collection: true,
            list_result: true,
            ..single
        };
        assert!(matches!(validation_failure(&batch, failures), ValidationFailure::Batch(_)));
    }
}
