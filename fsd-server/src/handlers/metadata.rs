//! Metadata history. These return bare arrays rather than the envelope.

use axum::{Json, extract::State};

use fsd_core::database::MetadataRow;

use crate::infra::{AppResult, AppState, errors::AppError};

/// Every recorded row, newest first.
pub async fn list_metadata(State(state): State<AppState>) -> AppResult<Json<Vec<MetadataRow>>> {
    let rows = state.db.metadata().list_all().await?;
    non_empty(rows)
}

/// The newest row for each path.
pub async fn latest_metadata(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<MetadataRow>>> {
    let rows = state.db.metadata().latest_per_path().await?;
    non_empty(rows)
}

fn non_empty(rows: Vec<MetadataRow>) -> AppResult<Json<Vec<MetadataRow>>> {
    if rows.is_empty() {
        return Err(AppError::not_found());
    }
    Ok(Json(rows))
}
