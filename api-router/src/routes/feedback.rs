use axum::{extract::State, Json};
use common::{error::AppError, storage::types::feedback::Feedback};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub memory_id: String,
    #[serde(default)]
    pub feedback_text: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
}

/// `POST /feedback` (§6): upserts rating/text/favorite onto the Feedback row for `memory_id`.
/// Rejects an out-of-range `rating` (§3 `Feedback` invariant: `rating ∈ {1..5}`).
pub async fn post_feedback(
    State(state): State<ApiState>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<Feedback>, ApiError> {
    if let Some(rating) = body.rating {
        if !(1..=5).contains(&rating) {
            return Err(AppError::BadInput(format!(
                "rating must be between 1 and 5, got {rating}"
            ))
            .into());
        }
    }

    let feedback = Feedback::apply(
        &state.db,
        &body.memory_id,
        body.feedback_text,
        body.rating,
        body.is_favorite,
    )
    .await?;

    Ok(Json(feedback))
}

/// `GET /favorites` (§6).
pub async fn favorites(State(state): State<ApiState>) -> Result<Json<Vec<Feedback>>, ApiError> {
    Ok(Json(Feedback::favorites(&state.db).await?))
}
