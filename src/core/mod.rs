//! Core module containing the request pipeline building blocks

pub mod criteria;
pub mod entity;
pub mod error;
pub mod field;
pub mod filter;
pub mod query;
pub mod relations;
pub mod request;
pub mod resolve;
pub mod response;
pub mod store;
pub mod validation;

pub use criteria::{Condition, CriteriaDefaults, Operator, Selection};
pub use entity::{Entity, Record, RelatedData, Scenario};
pub use error::{ApiError, FieldErrors, StoreError, ValidationFailure};
pub use field::{Attributes, FieldFormat, FieldValue};
pub use query::QueryParams;
pub use relations::{AttributeList, RelationConfig, RelationSpec, ReturnMode};
pub use request::{RequestContext, Verb};
pub use response::{ContentRange, OperationResult, ResponseFormat, ResponseProvider};
pub use store::{Store, StoreRegistry};
pub use validation::Rule;
