// HTTP trigger handlers
use crate::application::clean_service::CleanParams;
use crate::application::error::ReplayError;
use crate::application::fill_service::FillParams;
use crate::application::stream_service::StreamParams;
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Cumulative counters of the current or last fill run.
pub async fn progress_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.progress.snapshot())
}

/// Start a bulk fill in the background.
pub async fn trigger_fill(
    State(state): State<Arc<AppState>>,
    Json(params): Json<FillParams>,
) -> Response {
    if let Err(error) = state.fill_service.validate(&params) {
        return config_error(error);
    }
    let Some(guard) = state.try_claim() else {
        return busy();
    };
    let task_state = state.clone();
    tokio::spawn(async move {
        let _guard = guard;
        match task_state.fill_service.fill(params).await {
            Ok(report) => tracing::info!(
                loaded = report.files_loaded,
                failed = report.files_failed,
                points = report.points_written,
                "fill finished"
            ),
            Err(error) => tracing::error!(%error, "fill failed"),
        }
    });
    accepted("fill")
}

/// Start a live replay in the background.
pub async fn trigger_stream(
    State(state): State<Arc<AppState>>,
    Json(params): Json<StreamParams>,
) -> Response {
    if let Err(error) = state.stream_service.validate(&params) {
        return config_error(error);
    }
    let Some(guard) = state.try_claim() else {
        return busy();
    };
    let task_state = state.clone();
    tokio::spawn(async move {
        let _guard = guard;
        match task_state.stream_service.stream(params).await {
            Ok(outcome) => tracing::info!(?outcome, "stream finished"),
            Err(error) => tracing::error!(%error, "stream failed"),
        }
    });
    accepted("stream")
}

/// Start a range clean in the background.
pub async fn trigger_clean(
    State(state): State<Arc<AppState>>,
    Json(params): Json<CleanParams>,
) -> Response {
    let Some(guard) = state.try_claim() else {
        return busy();
    };
    let task_state = state.clone();
    tokio::spawn(async move {
        let _guard = guard;
        match task_state.clean_service.clean(params).await {
            Ok(report) => tracing::info!(
                issued = report.deletes_issued,
                failed = report.deletes_failed,
                "clean finished"
            ),
            Err(error) => tracing::error!(%error, "clean failed"),
        }
    });
    accepted("clean")
}

fn accepted(operation: &str) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "operation": operation })),
    )
        .into_response()
}

fn busy() -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": "an operation is already in progress" })),
    )
        .into_response()
}

fn config_error(error: ReplayError) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": error.to_string() })),
    )
        .into_response()
}
