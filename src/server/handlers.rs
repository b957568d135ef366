//! HTTP handlers for controller routes
//!
//! Handlers are generic: they build a [`RequestContext`] from the request,
//! look the controller up by route name and serialize its result with the
//! provider negotiated by the `format` parameter.

use super::registry::ControllerRegistry;
use crate::core::error::ApiError;
use crate::core::query::QueryParams;
use crate::core::request::{RequestContext, Verb, decode_body};
use crate::core::response::{OperationResult, ResponseFormat};
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controllers: Arc<ControllerRegistry>,
}

/// `/{prefix}/{controller}`
pub async fn handle_collection(
    State(state): State<AppState>,
    Path(controller): Path<String>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    dispatch(&state, &controller, None, &method, query.as_deref(), &body).await
}

/// `/{prefix}/{controller}/{id}`
pub async fn handle_item(
    State(state): State<AppState>,
    Path((controller, id)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    dispatch(&state, &controller, Some(id), &method, query.as_deref(), &body).await
}

async fn dispatch(
    state: &AppState,
    name: &str,
    id: Option<String>,
    method: &Method,
    query: Option<&str>,
    body: &[u8],
) -> Response {
    let params = QueryParams::from_query_str(query.unwrap_or_default());
    let provider = ResponseFormat::from_param(params.format.as_deref()).provider();

    // Identifiers in the path are numeric only
    if id.as_deref().is_some_and(|id| id.is_empty() || !id.chars().all(|c| c.is_ascii_digit())) {
        return OperationResult::from_error(&ApiError::NotFound).into_response_with(provider.as_ref());
    }

    let Some(controller) = state.controllers.get(name) else {
        tracing::debug!(controller = %name, "No controller for route");
        return OperationResult::from_error(&ApiError::NotFound).into_response_with(provider.as_ref());
    };

    let Some(verb) = Verb::from_method(method) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };

    let mut ctx = RequestContext::new(verb)
        .with_params(params)
        .with_body(decode_body(body));
    ctx.id = id;

    controller
        .handle(&ctx)
        .await
        .into_response_with(provider.as_ref())
}
