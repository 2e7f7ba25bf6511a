use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Taxonomy of failures the query-answering core can raise. Load-bearing
/// failures (embedding the query, vector search, final synthesis) abort the
/// request; advisory failures (graph enrichment, verifier, the planner,
/// individual classifier/sub-answer calls) are recovered by the caller and
/// never surface as one of these.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing/invalid fields, empty query, `k` out of range.
    #[error("bad input: {0}")]
    BadInput(String),
    /// Unknown memory id, thread id, or chunk id.
    #[error("not found: {0}")]
    NotFound(String),
    /// Duplicate thread creation for a memory entry that already has one.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Embedder or LLM returned an error or non-parseable output.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Per-call or whole-pipeline deadline exceeded.
    #[error("timeout: {0}")]
    Timeout(String),
    /// Database unavailable or integrity failure.
    #[error("store error: {0}")]
    Store(String),
    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("openai error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("llm parsing error: {0}")]
    LlmParsing(String),
    #[error("task join error: {0}")]
    Join(#[from] JoinError),
}
