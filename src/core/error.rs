//! Typed error handling for controller operations
//!
//! Every failure a controller can hit is an [`ApiError`]. Errors never escape to
//! the transport layer as panics or framework errors: they are turned into an
//! `{"error": ...}` payload plus a status code.
//!
//! # Error Categories
//!
//! - client input (400): empty body, failed validation, unknown relation, store
//!   constraint violations
//! - not found (404)
//! - configuration (500): a controller with no store bound
//! - access denied (403)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::fmt;

/// Validation messages per attribute
pub type FieldErrors = IndexMap<String, Vec<String>>;

/// Message sent when an entity cannot be found
pub const NOT_FOUND_MESSAGE: &str = "Not found";

/// Message sent when a controller has no store bound
pub const WRONG_MODEL_MESSAGE: &str = "Wrong collection model.";

/// Message sent when a write request carries no data
pub const EMPTY_BODY_MESSAGE: &str = "Data is not received.";

/// Message sent when access is denied
pub const ACCESS_DENIED_MESSAGE: &str = "You do not have sufficient permissions to access.";

/// The main error type of controller operations
#[derive(Debug)]
pub enum ApiError {
    /// A create or update request carried no data
    EmptyBody,

    /// One or more targets failed validation
    Validation(ValidationFailure),

    /// A `with` key that is not configured for the controller
    UnknownRelation { relation: String },

    /// The store rejected a read or a write
    Store(StoreError),

    /// No entity at the requested id, or no targets matched
    NotFound,

    /// The controller is misconfigured
    Configuration { message: String },

    /// Access was denied by the controller's access check
    AccessDenied,
}

/// Validation errors of one or many targets
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    /// Errors of the single target of the request
    Single(FieldErrors),
    /// Errors keyed by the position of each failing target
    Batch(IndexMap<usize, FieldErrors>),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::EmptyBody => write!(f, "{}", EMPTY_BODY_MESSAGE),
            ApiError::Validation(ValidationFailure::Single(errors)) => {
                write!(f, "Validation failed on {} attribute(s)", errors.len())
            }
            ApiError::Validation(ValidationFailure::Batch(errors)) => {
                write!(f, "Validation failed on {} target(s)", errors.len())
            }
            ApiError::UnknownRelation { relation } => {
                write!(f, "relation {} does not exists.", relation)
            }
            ApiError::Store(e) => write!(f, "{}", e),
            ApiError::NotFound => write!(f, "{}", NOT_FOUND_MESSAGE),
            ApiError::Configuration { message } => {
                write!(f, "Configuration error: {}", message)
            }
            ApiError::AccessDenied => write!(f, "{}", ACCESS_DENIED_MESSAGE),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::EmptyBody
            | ApiError::Validation(_)
            | ApiError::UnknownRelation { .. }
            | ApiError::Store(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::AccessDenied => StatusCode::FORBIDDEN,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::EmptyBody => "EMPTY_BODY",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::UnknownRelation { .. } => "UNKNOWN_RELATION",
            ApiError::Store(e) => e.error_code(),
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Configuration { .. } => "CONFIG_ERROR",
            ApiError::AccessDenied => "ACCESS_DENIED",
        }
    }

    /// The `{"error": ...}` payload sent to the client
    pub fn to_payload(&self) -> Value {
        let detail = match self {
            ApiError::EmptyBody => json!(EMPTY_BODY_MESSAGE),
            ApiError::Validation(ValidationFailure::Single(errors)) => json!(errors),
            ApiError::Validation(ValidationFailure::Batch(errors)) => {
                let keyed: serde_json::Map<String, Value> = errors
                    .iter()
                    .map(|(position, errors)| (position.to_string(), json!(errors)))
                    .collect();
                Value::Object(keyed)
            }
            ApiError::UnknownRelation { .. } => json!({ "relation": self.to_string() }),
            ApiError::Store(e) => e.detail(),
            ApiError::NotFound => json!([NOT_FOUND_MESSAGE]),
            ApiError::Configuration { .. } => json!([WRONG_MODEL_MESSAGE]),
            ApiError::AccessDenied => json!({ "access": ACCESS_DENIED_MESSAGE }),
        };
        json!({ "error": detail })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_payload());
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by store implementations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A row could not be found for an update or a delete
    #[error("{entity_type} with id '{id}' not found")]
    Missing { entity_type: String, id: String },

    /// A constraint on an attribute or a relation was violated
    #[error("Constraint violated on '{attribute}': {message}")]
    Constraint { attribute: String, message: String },

    /// Criteria referenced an attribute the entity does not have
    #[error("Unknown column '{0}' in criteria")]
    UnknownAttribute(String),

    /// The order clause could not be parsed
    #[error("Invalid order clause '{0}'")]
    InvalidOrder(String),

    /// No table is registered for the entity type
    #[error("Unknown entity type '{0}'")]
    UnknownEntity(String),

    /// Backend failure (lock poisoning, connection loss...)
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Missing { .. } => "STORE_ROW_MISSING",
            StoreError::Constraint { .. } => "STORE_CONSTRAINT",
            StoreError::UnknownAttribute(_) => "STORE_UNKNOWN_ATTRIBUTE",
            StoreError::InvalidOrder(_) => "STORE_INVALID_ORDER",
            StoreError::UnknownEntity(_) => "STORE_UNKNOWN_ENTITY",
            StoreError::Backend(_) => "STORE_BACKEND",
        }
    }

    /// Detail placed under `"error"` in the response payload.
    ///
    /// Constraint violations are reported like validation errors, everything
    /// else as the error message.
    pub fn detail(&self) -> Value {
        match self {
            StoreError::Constraint { attribute, message } => {
                let mut detail = serde_json::Map::new();
                detail.insert(attribute.clone(), json!([message]));
                Value::Object(detail)
            }
            other => Value::String(other.to_string()),
        }
    }
}
