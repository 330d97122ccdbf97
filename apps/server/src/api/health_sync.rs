//! Admin endpoints for health sync.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use migraineme_health_sync::{JobOutcome, SyncStatusReport};

use crate::context::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    outcome: &'static str,
    reason: Option<String>,
    status: SyncStatusReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecoveryResponse {
    affected: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurgeParams {
    older_than_days: i64,
}

async fn run_response(
    state: &AppState,
    job: &str,
    outcome: Option<JobOutcome>,
) -> ApiResult<Json<RunResponse>> {
    let outcome = outcome.ok_or_else(|| {
        ApiError::Conflict(format!("{} is already running or not scheduled", job))
    })?;
    let (outcome, reason) = match outcome {
        JobOutcome::Success => ("success", None),
        JobOutcome::Retry(reason) => ("retry", Some(reason)),
        JobOutcome::Failure(reason) => ("failure", Some(reason)),
    };
    Ok(Json(RunResponse {
        outcome,
        reason,
        status: state.status.report().await?,
    }))
}

async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<SyncStatusReport>> {
    Ok(Json(state.status.report().await?))
}

async fn trigger_push(State(state): State<Arc<AppState>>) -> ApiResult<Json<RunResponse>> {
    info!("[HealthSync] Manual push requested");
    let outcome = state.runtime.push_now().await;
    run_response(&state, "Push", outcome).await
}

async fn trigger_pull(State(state): State<Arc<AppState>>) -> ApiResult<Json<RunResponse>> {
    info!("[HealthSync] Manual pull requested");
    let outcome = state.runtime.pull_now().await;
    run_response(&state, "Pull", outcome).await
}

async fn reset_failed(State(state): State<Arc<AppState>>) -> ApiResult<Json<RecoveryResponse>> {
    let affected = state.recovery.reset_failed().await?;
    Ok(Json(RecoveryResponse { affected }))
}

async fn reset_all(State(state): State<Arc<AppState>>) -> ApiResult<Json<RecoveryResponse>> {
    let affected = state.recovery.reset_all().await?;
    Ok(Json(RecoveryResponse { affected }))
}

async fn wipe(State(state): State<Arc<AppState>>) -> ApiResult<Json<RecoveryResponse>> {
    info!("[HealthSync] Wiping outbox and changes token");
    let affected = state.recovery.wipe_for_full_resync().await?;
    Ok(Json(RecoveryResponse { affected }))
}

async fn purge_stale(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PurgeParams>,
) -> ApiResult<Json<RecoveryResponse>> {
    let affected = state.recovery.purge_stale(params.older_than_days).await?;
    Ok(Json(RecoveryResponse { affected }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health-sync/status", get(get_status))
        .route("/health-sync/push", post(trigger_push))
        .route("/health-sync/pull", post(trigger_pull))
        .route("/health-sync/recovery/reset-failed", post(reset_failed))
        .route("/health-sync/recovery/reset-all", post(reset_all))
        .route("/health-sync/recovery/wipe", post(wipe))
        .route("/health-sync/recovery/purge-stale", post(purge_stale))
}
