//! Router builder utilities for controller routes

use super::handlers::{AppState, handle_collection, handle_item};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

/// Build the controller routes under `prefix`
///
/// These routes are generic and work for every registered controller:
/// - GET|POST|PUT|DELETE /{prefix}/{controller}
/// - GET|PUT|DELETE /{prefix}/{controller}/{id}
pub fn build_controller_routes(prefix: &str, state: AppState) -> Router {
    let base = match prefix.trim_matches('/') {
        "" => String::new(),
        prefix => format!("/{}", prefix),
    };

    Router::new()
        .route(
            &format!("{}/{{controller}}", base),
            get(handle_collection)
                .post(handle_collection)
                .put(handle_collection)
                .delete(handle_collection),
        )
        .route(
            &format!("{}/{{controller}}/{{id}}", base),
            get(handle_item).put(handle_item).delete(handle_item),
        )
        .with_state(state)
}

/// `/health` and `/healthz`
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "restmodel"
    }))
}
