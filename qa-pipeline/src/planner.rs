//! Subquestion planner (C8): decomposes a complex question into 2..=MAX_SUBQUESTIONS focused
//! subquestions when the selected context is large enough to warrant it (§4.8).

use common::{
    storage::types::chunk_embedding::ScoredChunk,
    utils::{
        config::AppConfig,
        llm::{CompletionOptions, LlmClient, SchemaTag, StructuredReply},
    },
};
use tracing::instrument;

const SYSTEM_PROMPT: &str = "You decompose a complex question into a short list of focused, \
self-contained subquestions that together would let someone answer the original question using \
the provided context. Each subquestion must stand on its own without referring to \"the \
question\" or \"the context\".";

/// Total character length of the selected chunks' text, the trigger metric for §4.8.
pub fn selected_context_length(chunks: &[ScoredChunk]) -> usize {
    chunks.iter().map(|c| c.chunk.text.len()).sum()
}

/// Whether amplification should activate for this query (§4.8 trigger).
pub fn should_amplify(chunks: &[ScoredChunk], config: &AppConfig, use_amplification: bool) -> bool {
    config.enable_subquestion_amplification
        && use_amplification
        && selected_context_length(chunks) > config.amplification_min_context_length
}

fn context_digest(chunks: &[ScoredChunk], per_chunk_chars: usize) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let text = &c.chunk.text;
            let truncated: String = text.chars().take(per_chunk_chars).collect();
            format!("[{}] {}", i + 1, truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Produces 2..=`config.max_subquestions` subquestions. Returns `Ok(None)` when planning could
/// not produce a usable decomposition (too few questions, parse failure) so the caller proceeds
/// without amplification rather than failing the request (§4.8, §7 advisory recovery).
#[instrument(skip_all, fields(question_len = question.len()))]
pub async fn plan_subquestions(
    llm: &LlmClient,
    config: &AppConfig,
    question: &str,
    chunks: &[ScoredChunk],
) -> Option<Vec<String>> {
    let digest = context_digest(chunks, 200);
    let user = format!(
        "Original question: {question}\n\nContext digest:\n{digest}\n\nList 2 to {} \
         self-contained subquestions that would help answer the original question.",
        config.max_subquestions
    );
    let options = CompletionOptions::new(config.generation_model.clone());

    let reply = llm.complete_structured(
        config,
        &options,
        SYSTEM_PROMPT,
        &user,
        SchemaTag::QuestionList,
    )
    .await;

    match reply {
        Ok(StructuredReply::QuestionList(mut questions)) => {
            questions.truncate(config.max_subquestions);
            if questions.len() >= 2 {
                Some(questions)
            } else {
                None
            }
        }
        Ok(_) | Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::chunk::Chunk;

    fn chunk_of_len(len: usize) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new("x".repeat(len), "src".into(), "hash".into()),
            similarity: 0.5,
        }
    }

    #[test]
    fn should_amplify_respects_threshold_and_flags() {
        let mut config_json = serde_json::json!({
            "openai_api_key": "k",
            "surrealdb_address": "mem://",
            "surrealdb_username": "r",
            "surrealdb_password": "r",
            "surrealdb_namespace": "n",
            "surrealdb_database": "d",
        });
        let config: AppConfig = serde_json::from_value({
            config_json["amplification_min_context_length"] = serde_json::json!(10);
            config_json
        })
        .expect("config");

        let short = vec![chunk_of_len(2)];
        assert!(!should_amplify(&short, &config, true));

        let long = vec![chunk_of_len(20)];
        assert!(should_amplify(&long, &config, true));
        assert!(!should_amplify(&long, &config, false));
    }
}
