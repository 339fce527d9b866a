use axum::{Json, extract::State};

use fsd_core::database::DiskStatsRow;

use crate::infra::{AppResult, AppState, errors::AppError};

pub async fn list_disk_stats(State(state): State<AppState>) -> AppResult<Json<Vec<DiskStatsRow>>> {
    Ok(Json(state.db.disk_stats().list_all().await?))
}

pub async fn latest_disk_stats(State(state): State<AppState>) -> AppResult<Json<DiskStatsRow>> {
    state
        .db
        .disk_stats()
        .latest()
        .await?
        .map(Json)
        .ok_or_else(AppError::not_found)
}
