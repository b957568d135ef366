//! Server module for exposing controllers over HTTP
//!
//! This module provides a `ServerBuilder` that registers:
//! - the routes of every controller under a path prefix
//! - health check routes
//! - tracing and CORS layers

pub mod builder;
pub mod handlers;
pub mod layers;
pub mod registry;
pub mod router;

pub use builder::ServerBuilder;
pub use handlers::AppState;
pub use layers::init_tracing;
pub use registry::ControllerRegistry;
