//! REST endpoints.
//!
//! - `POST /v1/query`: submit a statement, returns the first page.
//! - `GET /v1/query/{query_id}/{slug}/{token}`: the page a continuation URI points at.
//! - `GET /health`, `GET /ready`, `GET /metrics`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sluice_common::telemetry::ERRORS_TARGET;
use sluice_common::{QueryRequest, QueryResponse};
use sluice_error::{ErrorCode, SluiceError};

use crate::error::ApiError;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/query", post(submit_query))
        .route("/v1/query/{query_id}/{slug}/{token}", get(fetch_next))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ContinuationParams {
    pub batch_size: Option<usize>,
    /// Seconds; streaming queries only.
    pub timeout: Option<u64>,
}

async fn submit_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    state.metrics.record_submitted();

    let Json(request) = payload.map_err(|rejection| {
        state.fail(SluiceError::new(
            ErrorCode::InvalidRequest,
            rejection.body_text(),
        ))
    })?;

    let response = state
        .gateway
        .submit(request)
        .await
        .map_err(|e| state.fail(e))?;
    state.metrics.record_page();
    Ok(Json(response))
}

async fn fetch_next(
    State(state): State<AppState>,
    Path((query_id, slug, token)): Path<(String, String, u64)>,
    Query(params): Query<ContinuationParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let response = state
        .gateway
        .fetch_next(&query_id, &slug, token, params.batch_size, params.timeout)
        .await
        .map_err(|e| state.fail(e))?;
    state.metrics.record_page();
    Ok(Json(response))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ready",
        "live_queries": state.gateway.live_queries(),
        "capacity": state.gateway.capacity(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    state
        .metrics
        .set_live_queries(state.gateway.live_queries());

    match state.metrics.render() {
        Ok((content_type, body)) => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            tracing::error!(target: ERRORS_TARGET, "Failed to encode metrics: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
