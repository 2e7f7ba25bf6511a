//! QA pipeline orchestrator (C11): composes C1-C10 into the end-to-end query path, with the
//! concurrency, budgeting, and timeout rules from §5 (§4.11).

use std::time::{Duration, Instant};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            chunk_embedding::{ChunkEmbedding, ScoredChunk},
            feedback::Feedback,
            memory_entry::MemoryEntry,
            thread_message::ThreadMessage,
        },
    },
    utils::{config::AppConfig, llm::LlmClient},
};
use tracing::{info, instrument, warn};

use crate::{
    classify::{classify_chunks, select_with_fallback},
    enrich::{self, CommunityPresentation, EntityPresentation},
    memory,
    planner::{plan_subquestions, should_amplify},
    synthesize::{synthesize_amplified, synthesize_direct, SubquestionTrace},
    verify::{concat_context, verify_answer},
};

const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_CLAMP: usize = 50;

/// Per-request toggles accepted from the HTTP surface (§6 `POST /query` body).
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub max_results: usize,
    pub use_memory: bool,
    pub use_amplification: bool,
    pub use_smart_selection: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            use_memory: true,
            use_amplification: true,
            use_smart_selection: true,
        }
    }
}

/// A retrieved chunk as presented to the caller (§6 `chunks` array).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChunkPresentation {
    pub id: String,
    pub text: String,
    pub source: String,
    pub similarity: f32,
}

/// The full response envelope for `answer()` (§4.11 step 10).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Response {
    pub query: String,
    pub answer: String,
    pub chunks: Vec<ChunkPresentation>,
    pub entities: Vec<EntityPresentation>,
    pub communities: Vec<CommunityPresentation>,
    pub references: Vec<String>,
    pub subquestions: Option<Vec<SubquestionTraceOut>>,
    pub verification_score: Option<f32>,
    pub low_confidence: bool,
    pub from_memory: bool,
    pub memory_id: Option<String>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SubquestionTraceOut {
    pub question: String,
    pub answer: String,
}

impl From<SubquestionTrace> for SubquestionTraceOut {
    fn from(trace: SubquestionTrace) -> Self {
        Self {
            question: trace.question,
            answer: trace.answer,
        }
    }
}

/// Validates and clamps `max_results` per §8 boundary behaviors: 0 is rejected, values above 50
/// are clamped rather than rejected.
fn resolve_max_results(requested: usize) -> Result<usize, AppError> {
    if requested == 0 {
        return Err(AppError::BadInput("max_results must be at least 1".into()));
    }
    Ok(requested.min(MAX_RESULTS_CLAMP))
}

/// End-to-end answer path for a single query (§4.11). Wrapped in the overall pipeline deadline
/// (§5); on timeout, in-flight work is dropped and the request fails with `Timeout`.
#[instrument(skip_all, fields(question_len = question.len()))]
pub async fn answer(
    db: &SurrealDbClient,
    llm: &LlmClient,
    config: &AppConfig,
    question: &str,
    options: QueryOptions,
) -> Result<Response, AppError> {
    let deadline = Duration::from_secs(config.pipeline_deadline_secs);

    match tokio::time::timeout(deadline, answer_inner(db, llm, config, question, options)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(
            "query pipeline exceeded its overall deadline".into(),
        )),
    }
}

async fn answer_inner(
    db: &SurrealDbClient,
    llm: &LlmClient,
    config: &AppConfig,
    question: &str,
    options: QueryOptions,
) -> Result<Response, AppError> {
    let start = Instant::now();

    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::BadInput("query must not be empty".into()));
    }
    let max_results = resolve_max_results(options.max_results)?;

    // Step 1: memory short-circuit, exact match first (no embedder/LLM call needed).
    if config.enable_memory && options.use_memory {
        if let Some(hit) = memory::lookup_exact(db, question).await? {
            return Ok(build_memory_response(db, question, hit, start).await);
        }
    }

    // Step 2: embed the question. Needed for semantic memory match and, on miss, retrieval.
    let question_embedding = llm.embed(config, question).await?;

    if config.enable_memory && options.use_memory {
        if let Some(hit) =
            memory::lookup_semantic(db, &question_embedding, config.memory_similarity_threshold)
                .await?
        {
            return Ok(build_memory_response(db, question, hit, start).await);
        }
    }

    // Step 3: retrieve top-k chunks (C4). Load-bearing: a failure here aborts the request.
    let retrieved = ChunkEmbedding::vector_search(db, &question_embedding, max_results).await?;

    // Step 4: optional smart selection (C7).
    let selected = if options.use_smart_selection && config.enable_chunk_classification {
        let verdicts = classify_chunks(llm, config, question, &retrieved).await;
        select_with_fallback(retrieved, &verdicts, config.min_keep)
    } else {
        retrieved
    };
    let selected = stable_order(selected);

    // Step 5 + 6: optional amplification (C8 + C9 amplified mode), else direct synthesis (C9).
    let (synthesis, subquestions) =
        if should_amplify(&selected, config, options.use_amplification) {
            match plan_subquestions(llm, config, question, &selected).await {
                Some(subquestions) => {
                    match synthesize_amplified(llm, config, question, &subquestions, &selected)
                        .await
                    {
                        Ok((result, traces)) => (
                            result,
                            Some(traces.into_iter().map(SubquestionTraceOut::from).collect()),
                        ),
                        Err(err) => {
                            warn!(error = %err, "amplified synthesis failed, falling back to direct");
                            (synthesize_direct(llm, config, question, &selected).await?, None)
                        }
                    }
                }
                None => (synthesize_direct(llm, config, question, &selected).await?, None),
            }
        } else {
            (synthesize_direct(llm, config, question, &selected).await?, None)
        };

    // Step 7: verification (C10), advisory. Skipped when no chunks were retrieved:
    // the answer is the fixed refusal text, not a claim grounded in context to verify.
    let verification_score = if config.enable_answer_verification && !selected.is_empty() {
        let context = concat_context(&selected);
        match verify_answer(llm, config, question, &synthesis.answer, &context).await {
            Ok(score) => Some(score),
            Err(err) => {
                warn!(error = %err, "answer verification failed, omitting score");
                None
            }
        }
    } else {
        None
    };
    let low_confidence =
        verification_score.map_or(false, |score| score < config.verification_threshold);

    // Step 9 (performed early so its output can be persisted alongside the memory entry):
    // advisory graph enrichment for presentation.
    let chunk_ids: Vec<String> = selected.iter().map(|c| c.chunk.id.clone()).collect();
    let (entities, communities) = enrich::enrich(db, &chunk_ids).await;

    // Step 8: persist to memory (failures are logged, never fail the request, §7).
    let entity_ids: Vec<String> = entities.iter().map(|e| e.entity.clone()).collect();
    let community_ids: Vec<i64> = communities.iter().map(|c| c.community_id).collect();

    let memory_id = if config.enable_memory && options.use_memory {
        match memory::insert(
            db,
            question.to_string(),
            question_embedding,
            synthesis.answer.clone(),
            synthesis.references.clone(),
            chunk_ids.clone(),
            entity_ids,
            community_ids,
        )
        .await
        {
            Ok(entry) => Some(entry.id),
            Err(err) => {
                warn!(error = %err, "failed to persist memory entry, answer is still returned");
                None
            }
        }
    } else {
        None
    };

    let chunks = selected
        .into_iter()
        .map(|c| ChunkPresentation {
            id: c.chunk.id,
            text: c.chunk.text.clone(),
            source: c.chunk.source,
            similarity: c.similarity,
        })
        .collect();

    info!(processing_time_ms = start.elapsed().as_millis() as u64, "query answered");

    Ok(Response {
        query: question.to_string(),
        answer: synthesis.answer,
        chunks,
        entities,
        communities,
        references: synthesis.references,
        subquestions,
        verification_score,
        low_confidence,
        from_memory: false,
        memory_id,
        processing_time_ms: start.elapsed().as_millis() as u64,
    })
}

/// Stable ordering required by §5 and §8 invariant 8: descending similarity, ties broken by
/// ascending chunk id. `vector_search` already applies this, but classification filtering can
/// change the subset, so we reapply it to the selected set.
fn stable_order(mut chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    chunks.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    chunks
}

async fn build_memory_response(
    db: &SurrealDbClient,
    question: &str,
    hit: memory::MemoryHit,
    start: Instant,
) -> Response {
    let (entities, communities) = enrich::enrich(db, &hit.entry.chunk_ids).await;

    let chunks = hit
        .chunks
        .into_iter()
        .map(|c| ChunkPresentation {
            id: c.id,
            text: c.text.clone(),
            source: c.source,
            similarity: 1.0,
        })
        .collect();

    Response {
        query: question.to_string(),
        answer: hit.entry.answer,
        chunks,
        entities,
        communities,
        references: hit.entry.refs,
        subquestions: None,
        verification_score: None,
        low_confidence: false,
        from_memory: true,
        memory_id: Some(hit.entry.id),
        processing_time_ms: start.elapsed().as_millis() as u64,
    }
}

/// Administrative operations over memory (§6 memory endpoints).
pub async fn memory_stats(db: &SurrealDbClient) -> Result<common::storage::types::memory_entry::MemoryStats, AppError> {
    MemoryEntry::stats(db).await
}

pub async fn memory_get(db: &SurrealDbClient, id: &str) -> Result<MemoryEntry, AppError> {
    db.get_item::<MemoryEntry>(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("memory entry {id} not found")))
}

/// Deletes a MemoryEntry and cascades into its bound Feedback and ThreadMessage rows (§3
/// cascade-on-parent-delete): MemoryEntry -> Feedback -> ThreadMessage.
pub async fn memory_delete(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
    db.delete_item::<MemoryEntry>(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("memory entry {id} not found")))?;

    if let Some(feedback) = Feedback::delete_by_memory_id(db, id).await? {
        ThreadMessage::delete_by_feedback_id(db, &feedback.id).await?;
    }
    Ok(())
}

/// Clears the entire memory cache and cascades into every Feedback and ThreadMessage row
/// (§3 cascade-on-parent-delete).
pub async fn memory_clear(db: &SurrealDbClient) -> Result<(), AppError> {
    ThreadMessage::delete_all(db).await?;
    Feedback::delete_all(db).await?;
    MemoryEntry::clear_all(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::chunk::Chunk;

    fn scored(id_suffix: &str, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(format!("text-{id_suffix}"), format!("source-{id_suffix}"), "hash".into()),
            similarity,
        }
    }

    #[test]
    fn resolve_max_results_rejects_zero() {
        let err = resolve_max_results(0).unwrap_err();
        assert!(matches!(err, AppError::BadInput(_)));
    }

    #[test]
    fn resolve_max_results_clamps_above_fifty() {
        assert_eq!(resolve_max_results(500).unwrap(), 50);
        assert_eq!(resolve_max_results(3).unwrap(), 3);
    }

    #[test]
    fn stable_order_breaks_ties_by_ascending_chunk_id() {
        let mut a = scored("a", 0.5);
        let mut b = scored("b", 0.5);
        a.chunk.id = "2".to_string();
        b.chunk.id = "1".to_string();

        let ordered = stable_order(vec![a, b]);
        assert_eq!(ordered[0].chunk.id, "1");
        assert_eq!(ordered[1].chunk.id, "2");
    }
}
