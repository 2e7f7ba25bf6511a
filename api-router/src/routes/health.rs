use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// `GET /health` (§6): actually pings the database rather than returning a static `ok`.
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let database = match state.db.query("SELECT 1").await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "health check: database ping failed");
            "fail"
        }
    };

    let status = if database == "ok" { "ok" } else { "degraded" };
    let code = if database == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "services": { "database": database, "api": "ok" }
        })),
    )
}
