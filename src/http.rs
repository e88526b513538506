//! HTTP status surface
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use lendforge_chain::Address;
use lendforge_core::{jobs::MONITOR_JOB, EngineContext, JobError, Scheduler};

/// Default page size for `/liquidations`.
const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EngineContext>,
    pub scheduler: Arc<Scheduler>,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(err: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let status = match err {
            JobError::AlreadyRunning(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "lendforge-liquidator",
        "timestamp": chrono::Utc::now(),
    }))
}

pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.status_report(&state.scheduler).await)
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.executor.metrics().summary())
}

/// Out-of-schedule monitor cycle through the scheduler's job wrapper.
pub async fn monitor_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let result = state.scheduler.run_now(MONITOR_JOB).await?;
    Ok(Json(json!({ "success": true, "result": result })))
}

#[derive(Debug, Deserialize)]
pub struct RiskyParams {
    limit: Option<usize>,
}

pub async fn risky_positions_handler(
    State(state): State<AppState>,
    Query(params): Query<RiskyParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(state.engine.config.monitor.risky_page_size);
    let positions = state
        .engine
        .monitor
        .risky_positions(limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "count": positions.len(), "positions": positions })))
}

/// Index record and chain analysis for one account.
pub async fn position_handler(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user: Address = user
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid address: {user}")))?;
    let lookup = state
        .engine
        .monitor
        .lookup_position(user)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(lookup))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    limit: Option<usize>,
}

pub async fn liquidations_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let liquidations = state
        .engine
        .monitor
        .liquidation_history(limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "count": liquidations.len(), "liquidations": liquidations })))
}
