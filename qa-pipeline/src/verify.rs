//! Verifier (C10): scores an answer's grounding in its supplied context in [0,1] (§4.10).
//! Advisory: callers treat a failure here as "no score" rather than failing the request.

use common::{
    error::AppError,
    utils::{
        config::AppConfig,
        llm::{CompletionOptions, LlmClient, SchemaTag, StructuredReply},
    },
};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::instrument;

const SYSTEM_PROMPT: &str = "You rate how well an answer is supported by the context it was \
given, on a scale from 0.0 (entirely unsupported or contradicted) to 1.0 (every claim is \
directly backed by the context). Respond with only the numeric score.";

/// Rates `answer` against `context` (the concatenated selected chunks). Retried once since the
/// call is idempotent (§7).
#[instrument(skip_all, fields(answer_len = answer.len(), context_len = context.len()))]
pub async fn verify_answer(
    llm: &LlmClient,
    config: &AppConfig,
    question: &str,
    answer: &str,
    context: &str,
) -> Result<f32, AppError> {
    let user = format!("Question: {question}\n\nContext:\n{context}\n\nAnswer:\n{answer}");
    let options = CompletionOptions::new(config.generation_model.clone());
    let retry_strategy = ExponentialBackoff::from_millis(100).map(jitter).take(1);

    let reply = Retry::spawn(retry_strategy, || {
        llm.complete_structured(config, &options, SYSTEM_PROMPT, &user, SchemaTag::Score)
    })
    .await?;

    match reply {
        StructuredReply::Score(score) => Ok(score.clamp(0.0, 1.0)),
        _ => Err(AppError::LlmParsing(
            "verifier did not return a score".into(),
        )),
    }
}

/// Joins the selected chunks' text into the flat context string the verifier and direct
/// synthesizer both use.
pub fn concat_context(chunks: &[common::storage::types::chunk_embedding::ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::{chunk::Chunk, chunk_embedding::ScoredChunk};

    #[test]
    fn concat_context_joins_chunk_text() {
        let chunks = vec![
            ScoredChunk {
                chunk: Chunk::new("alpha".into(), "doc-a".into(), "h".into()),
                similarity: 0.9,
            },
            ScoredChunk {
                chunk: Chunk::new("beta".into(), "doc-b".into(), "h".into()),
                similarity: 0.8,
            },
        ];
        let context = concat_context(&chunks);
        assert!(context.contains("alpha"));
        assert!(context.contains("beta"));
    }
}
