use axum::{
    extract::{Path, State},
    Json,
};
use common::storage::types::{feedback::Feedback, thread_message::ThreadMessage};
use qa_pipeline::thread;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

fn default_max_results() -> usize {
    3
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    pub memory_id: String,
    pub thread_title: String,
}

/// `POST /thread/create` (§6): seeds a thread from a prior memory entry.
pub async fn create(
    State(state): State<ApiState>,
    Json(body): Json<CreateThreadRequest>,
) -> Result<Json<Feedback>, ApiError> {
    let feedback = thread::create(&state.db, &body.memory_id, body.thread_title).await?;
    Ok(Json(feedback))
}

/// `GET /threads` (§6): feedback rows that own a thread.
pub async fn list_threads(State(state): State<ApiState>) -> Result<Json<Vec<Feedback>>, ApiError> {
    Ok(Json(Feedback::threads(&state.db).await?))
}

/// `GET /thread/{id}` (§6): a thread's messages in creation order.
pub async fn get_thread(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ThreadMessage>>, ApiError> {
    Ok(Json(thread::list(&state.db, &id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ThreadMessageRequest {
    pub feedback_id: String,
    pub message: String,
    #[serde(default = "default_true")]
    pub enhance_with_retrieval: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

/// `POST /thread/message` (§6): appends a user turn and its synthesized assistant reply.
/// Serialized per thread id (§5) via `ApiState::thread_locks`, so two concurrent requests for
/// the same thread can't compute the same message sequence number.
pub async fn post_message(
    State(state): State<ApiState>,
    Json(body): Json<ThreadMessageRequest>,
) -> Result<Json<ThreadMessage>, ApiError> {
    let lock = state.thread_locks.get(&body.feedback_id);
    let _guard = lock.lock().await;

    let message = thread::append(
        &state.db,
        &state.llm,
        &state.config,
        &body.feedback_id,
        body.message,
        body.enhance_with_retrieval,
        body.max_results,
    )
    .await?;

    Ok(Json(message))
}
