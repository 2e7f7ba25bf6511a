//! Chunk classifier (C7): a binary LLM relevance judgment per (question, chunk) pair.

use std::sync::Arc;

use common::{
    error::AppError,
    storage::types::chunk_embedding::ScoredChunk,
    utils::{
        config::AppConfig,
        llm::{CompletionOptions, LlmClient, SchemaTag, StructuredReply},
    },
};
use tokio::sync::Semaphore;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{instrument, warn};

const SYSTEM_PROMPT: &str = "You judge whether a single passage of text contains information \
that would help answer a question. Respond with exactly \"Yes\" or \"No\", nothing else.";

/// Judges a single (question, chunk) pair. Ambiguous or failed output defaults to `false`
/// (§4.7); the call is retried once since it is idempotent (§7).
#[instrument(skip_all, fields(chunk_id = %chunk.chunk.id))]
async fn classify_one(
    llm: &LlmClient,
    config: &AppConfig,
    question: &str,
    chunk: &ScoredChunk,
) -> bool {
    let user = format!(
        "Question: {question}\n\nPassage:\n{}\n\nDoes this passage contain information that \
         would help answer the question? Respond with exactly Yes or No.",
        chunk.chunk.text,
    );
    let options = CompletionOptions::new(config.generation_model.clone());
    let retry_strategy = ExponentialBackoff::from_millis(100).map(jitter).take(1);

    let result = Retry::spawn(retry_strategy, || {
        llm.complete_structured(config, &options, SYSTEM_PROMPT, &user, SchemaTag::YesNo)
    })
    .await;

    match result {
        Ok(StructuredReply::YesNo(verdict)) => verdict,
        Ok(_) | Err(_) => {
            warn!("chunk classification failed or was ambiguous, defaulting to not relevant");
            false
        }
    }
}

/// Classifies every candidate chunk in parallel, bounded by `config.classify_concurrency`
/// (§5). A timed-out or errored classification defaults to false and never cancels siblings.
#[instrument(skip_all, fields(candidates = chunks.len()))]
pub async fn classify_chunks(
    llm: &LlmClient,
    config: &AppConfig,
    question: &str,
    chunks: &[ScoredChunk],
) -> Vec<(String, bool)> {
    let semaphore = Arc::new(Semaphore::new(config.classify_concurrency.max(1)));

    let futures = chunks.iter().map(|chunk| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire().await;
            let verdict = classify_one(llm, config, question, chunk).await;
            (chunk.chunk.id.clone(), verdict)
        }
    });

    futures::future::join_all(futures).await
}

/// Applies §4.7's fallback: chunks classified relevant form the selected set; if fewer than
/// `min_keep` remain, fall back to the top `min_keep` by vector similarity regardless of
/// classification.
pub fn select_with_fallback(
    chunks: Vec<ScoredChunk>,
    verdicts: &[(String, bool)],
    min_keep: usize,
) -> Vec<ScoredChunk> {
    let relevant: std::collections::HashSet<&String> = verdicts
        .iter()
        .filter(|(_, verdict)| *verdict)
        .map(|(id, _)| id)
        .collect();

    let selected: Vec<ScoredChunk> = chunks
        .iter()
        .filter(|c| relevant.contains(&c.chunk.id))
        .cloned()
        .collect();

    if selected.len() >= min_keep || selected.len() == chunks.len() {
        if selected.is_empty() {
            chunks.into_iter().take(min_keep).collect()
        } else {
            selected
        }
    } else {
        chunks.into_iter().take(min_keep).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::chunk::Chunk;

    fn scored(id: &str, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(format!("text {id}"), id.to_string(), "hash".into()),
            similarity,
        }
    }

    #[test]
    fn fallback_keeps_min_keep_when_nothing_classified_relevant() {
        let chunks = vec![scored("a", 0.9), scored("b", 0.8), scored("c", 0.7)];
        let ids: Vec<String> = chunks.iter().map(|c| c.chunk.id.clone()).collect();
        let verdicts: Vec<(String, bool)> = ids.into_iter().map(|id| (id, false)).collect();

        let selected = select_with_fallback(chunks, &verdicts, 2);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn keeps_only_relevant_when_enough_are_classified_true() {
        let chunks = vec![scored("a", 0.9), scored("b", 0.8), scored("c", 0.7)];
        let verdicts = vec![
            (chunks[0].chunk.id.clone(), true),
            (chunks[1].chunk.id.clone(), false),
            (chunks[2].chunk.id.clone(), true),
        ];

        let selected = select_with_fallback(chunks, &verdicts, 2);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().any(|c| c.chunk.id == "a" || c.chunk.source == "a"));
    }
}
