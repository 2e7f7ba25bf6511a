use api_state::ApiState;
use axum::{
    extract::FromRef,
    routing::{delete, get, post},
    Router,
};
use routes::{
    feedback::{favorites, post_feedback},
    health::health,
    memory::{clear, delete_entry, get_entry, stats},
    query::{classify_chunks, generate_subquestions, query, query_simple, verify_answer},
    thread::{create, get_thread, list_threads, post_message},
};

pub mod api_state;
pub mod error;
mod routes;

/// Router for the query-answering core's HTTP surface, version 1 (§6). There is no
/// authentication layer: the Non-goals explicitly leave the HTTP surface's access control to
/// the deployment environment.
pub fn api_routes_v1<S>(_app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/query/simple", post(query_simple))
        .route("/query/classify-chunks", post(classify_chunks))
        .route("/query/generate-subquestions", post(generate_subquestions))
        .route("/query/verify-answer", post(verify_answer))
        .route("/memory/stats", get(stats))
        .route("/memory/entry/{id}", get(get_entry).delete(delete_entry))
        .route("/memory/clear", delete(clear))
        .route("/feedback", post(post_feedback))
        .route("/favorites", get(favorites))
        .route("/thread/create", post(create))
        .route("/threads", get(list_threads))
        .route("/thread/{id}", get(get_thread))
        .route("/thread/message", post(post_message))
}
