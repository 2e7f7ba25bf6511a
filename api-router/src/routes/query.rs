use axum::{extract::State, Json};
use common::storage::types::{chunk::Chunk, chunk_embedding::ScoredChunk};
use qa_pipeline::{classify, orchestrator, planner, verify};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

fn default_max_results() -> usize {
    5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_true")]
    pub use_memory: bool,
    #[serde(default = "default_true")]
    pub use_amplification: bool,
    #[serde(default = "default_true")]
    pub use_smart_selection: bool,
}

/// `POST /query` (§6): the full pipeline, every stage enabled per the request body's toggles.
pub async fn query(
    State(state): State<ApiState>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<orchestrator::Response>, ApiError> {
    let options = orchestrator::QueryOptions {
        max_results: body.max_results,
        use_memory: body.use_memory,
        use_amplification: body.use_amplification,
        use_smart_selection: body.use_smart_selection,
    };

    let response = orchestrator::answer(&state.db, &state.llm, &state.config, &body.query, options)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct SimpleQueryRequest {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_true")]
    pub use_memory: bool,
}

/// `POST /query/simple` (§6): no classification, no amplification, no verification.
pub async fn query_simple(
    State(state): State<ApiState>,
    Json(body): Json<SimpleQueryRequest>,
) -> Result<Json<orchestrator::Response>, ApiError> {
    let options = orchestrator::QueryOptions {
        max_results: body.max_results,
        use_memory: body.use_memory,
        use_amplification: false,
        use_smart_selection: false,
    };

    let response = orchestrator::answer(&state.db, &state.llm, &state.config, &body.query, options)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ClassifyChunksRequest {
    pub query: String,
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChunkClassification {
    pub chunk_id: String,
    pub relevant: bool,
}

/// `POST /query/classify-chunks` (§6): exposes C7 directly, for callers that already have a
/// candidate chunk set and only want the relevance judgment.
pub async fn classify_chunks(
    State(state): State<ApiState>,
    Json(body): Json<ClassifyChunksRequest>,
) -> Result<Json<Vec<ChunkClassification>>, ApiError> {
    let chunks = Chunk::fetch_many(&body.chunk_ids, &state.db).await?;
    let scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| ScoredChunk {
            chunk,
            similarity: 0.0,
        })
        .collect();

    let verdicts = classify::classify_chunks(&state.llm, &state.config, &body.query, &scored).await;
    let results = verdicts
        .into_iter()
        .map(|(chunk_id, relevant)| ChunkClassification { chunk_id, relevant })
        .collect();

    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct GenerateSubquestionsRequest {
    pub query: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// `POST /query/generate-subquestions` (§6): exposes C8 directly. The context string, if given,
/// is treated as a single synthetic chunk so the planner's digest logic stays unchanged.
pub async fn generate_subquestions(
    State(state): State<ApiState>,
    Json(body): Json<GenerateSubquestionsRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    let chunks: Vec<ScoredChunk> = match body.context {
        Some(context) if !context.trim().is_empty() => vec![ScoredChunk {
            chunk: Chunk::new(context, "request-context".to_string(), String::new()),
            similarity: 0.0,
        }],
        _ => Vec::new(),
    };

    let subquestions = planner::plan_subquestions(&state.llm, &state.config, &body.query, &chunks)
        .await
        .unwrap_or_default();

    Ok(Json(subquestions))
}

#[derive(Debug, Deserialize)]
pub struct VerifyAnswerRequest {
    pub query: String,
    pub answer: String,
    pub context: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyAnswerResponse {
    pub score: f32,
}

/// `POST /query/verify-answer` (§6): exposes C10 directly.
pub async fn verify_answer(
    State(state): State<ApiState>,
    Json(body): Json<VerifyAnswerRequest>,
) -> Result<Json<VerifyAnswerResponse>, ApiError> {
    let score = verify::verify_answer(
        &state.llm,
        &state.config,
        &body.query,
        &body.answer,
        &body.context,
    )
    .await?;

    Ok(Json(VerifyAnswerResponse { score }))
}
