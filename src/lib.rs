//! # restmodel
//!
//! Generic REST controllers over relational tables.
//!
//! ## Features
//!
//! - **One controller per table**: list, view, create, update and delete with a
//!   single configurable orchestrator
//! - **Filtering and searching**: `filter` (exact, with `<`, `>`, `<>` prefixes)
//!   and `search` (substring) JSON parameters, ORed across groups
//! - **Pagination**: `limit`, `offset`, `order` and a `Content-Range` header
//! - **Relation embedding**: `with=comments,profile`, shaped per relation
//! - **Collections**: create, update and delete many rows in one request, with
//!   all-or-nothing validation and batched writes
//! - **Server-side guards**: base conditions, priority data, response
//!   allow-lists and an access check hook
//! - **Configuration-Based**: declare controllers in YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restmodel::prelude::*;
//!
//! let db = InMemoryDatabase::new();
//! let users = db.define(
//!     EntitySchema::new("user", ["name", "email"])
//!         .rule(Rule::new(["name", "email"], validators::required()))
//!         .unique("email"),
//! )?;
//!
//! let controller = ApiController::new("users", Arc::new(users))
//!     .with_safe_attributes(["id", "name", "email"]);
//!
//! ServerBuilder::new()
//!     .register(controller)
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod controller;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        criteria::{Condition, CriteriaDefaults, Operator, Selection},
        entity::{Entity, Record, RelatedData, Scenario},
        error::{ApiError, FieldErrors, StoreError, ValidationFailure},
        field::{Attributes, FieldFormat, FieldValue},
        query::QueryParams,
        relations::{AttributeList, RelationConfig, RelationSpec, ReturnMode},
        request::{RequestContext, Verb},
        response::{
            ContentRange, JsonResponseProvider, OperationResult, ResponseFormat,
            ResponseProvider, XmlResponseProvider,
        },
        store::{Store, StoreRegistry},
        validation::{Rule, validators},
    };

    // === Controller ===
    pub use crate::controller::ApiController;

    // === Storage ===
    pub use crate::storage::{
        EntitySchema, InMemoryDatabase, InMemoryStore, RelationDef, RelationKind,
    };

    // === Config ===
    pub use crate::config::{ApiConfig, ControllerConfig};

    // === Server ===
    pub use crate::server::{ControllerRegistry, ServerBuilder, init_tracing};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;

    // === Axum ===
    pub use axum::Router;
}
