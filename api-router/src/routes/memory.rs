use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::storage::types::memory_entry::MemoryStats;
use qa_pipeline::{memory_clear, memory_delete, memory_get, memory_stats};

use crate::{api_state::ApiState, error::ApiError};

/// `GET /memory/stats` (§6).
pub async fn stats(State(state): State<ApiState>) -> Result<Json<MemoryStats>, ApiError> {
    Ok(Json(memory_stats(&state.db).await?))
}

/// `GET /memory/entry/{id}` (§6).
pub async fn get_entry(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<common::storage::types::memory_entry::MemoryEntry>, ApiError> {
    Ok(Json(memory_get(&state.db, &id).await?))
}

/// `DELETE /memory/entry/{id}` (§6).
pub async fn delete_entry(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    memory_delete(&state.db, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /memory/clear` (§6).
pub async fn clear(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    memory_clear(&state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}
