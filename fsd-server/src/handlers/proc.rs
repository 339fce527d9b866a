use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use chrono::Utc;
use tracing::{info, warn};

use fsd_core::database::{ProcResultRow, ProcRow};
use fsd_core::procs::{ProcRequest, SUPPORTED_COMMANDS};

use crate::infra::{ApiResponse, AppResult, AppState, errors::AppError};

pub async fn list_procs(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<ProcRow>>> {
    Ok(ApiResponse::success(state.db.procs().list_all().await?))
}

pub async fn available_procs() -> ApiResponse<&'static [&'static str]> {
    ApiResponse::success(SUPPORTED_COMMANDS)
}

/// Validate a submission and queue it for the proc task.
pub async fn submit_proc(
    State(state): State<AppState>,
    body: Result<Json<ProcRequest>, JsonRejection>,
) -> AppResult<ApiResponse<ProcRow>> {
    let Json(request) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let spec = request.into_spec(state.root()).inspect_err(|err| {
        warn!(command = %request.command, error = %err, "rejected proc submission");
    })?;

    let row = state
        .db
        .procs()
        .insert(&spec.command, &spec.args_string(), Utc::now())
        .await?;
    info!(id = row.id, proc = %spec, "queued proc");

    Ok(ApiResponse::created(row))
}

pub async fn list_proc_results(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<ProcResultRow>>> {
    Ok(ApiResponse::success(state.db.procs().list_results().await?))
}

pub async fn proc_results_for(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<ProcResultRow>>> {
    let id: i64 = id
        .parse()
        .map_err(|_| AppError::bad_request(format!("invalid id: {id}")))?;
    Ok(ApiResponse::success(state.db.procs().results_for(id).await?))
}
