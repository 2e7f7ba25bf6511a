use std::sync::Arc;
use std::time::Duration;

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

use crate::{error::AppError, utils::config::AppConfig};

/// Per-call tuning for a chat completion (C2). Temperature 0 with a fixed model gives the
/// deterministic behavior the orchestrator relies on for repeat runs.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 800,
            temperature: 0.0,
        }
    }
}

/// The three response shapes `complete_structured` can coerce an LLM reply into (§4.2, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaTag {
    YesNo,
    Score,
    QuestionList,
}

#[derive(Debug, Clone)]
pub enum StructuredReply {
    YesNo(bool),
    Score(f32),
    QuestionList(Vec<String>),
}

/// Shared handle to the embedder/LLM upstream (C1 + C2), rate-limited across every request in
/// the process to `LLM_MAX_INFLIGHT` concurrent calls (§5): the gate is a single `Semaphore`
/// constructed once in `ApiState` and held by every caller, so embed/complete/complete_structured
/// calls queue past the cap instead of each stage racing the upstream independently.
#[derive(Clone)]
pub struct LlmClient {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    gate: Arc<Semaphore>,
}

/// Bounds a single outbound call to `duration` (§5 per-call timeouts), turning an elapsed
/// deadline into `AppError::Timeout` rather than letting it silently eat the pipeline budget.
async fn with_timeout<T>(
    duration: Duration,
    label: &str,
    fut: impl std::future::Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| AppError::Timeout(format!("{label} exceeded its per-call timeout")))?
}

impl LlmClient {
    pub fn new(config: &AppConfig) -> Self {
        let openai_config = async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url);
        Self {
            client: async_openai::Client::with_config(openai_config),
            gate: Arc::new(Semaphore::new(config.llm_max_inflight.max(1))),
        }
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn from_raw(
        client: async_openai::Client<async_openai::config::OpenAIConfig>,
        max_inflight: usize,
    ) -> Self {
        Self {
            client,
            gate: Arc::new(Semaphore::new(max_inflight.max(1))),
        }
    }

    /// Turns text into a fixed-dimension embedding vector (C1). Retries the upstream call once
    /// with jittered backoff before giving up with `AppError::Upstream`.
    pub async fn embed(&self, config: &AppConfig, input: &str) -> Result<Vec<f32>, AppError> {
        let _permit = self.gate.acquire().await;
        let retry_strategy = ExponentialBackoff::from_millis(100).map(jitter).take(1);
        let model = config.embedding_model.clone();
        let timeout = Duration::from_secs(config.embedding_timeout_secs);

        let embedding = Retry::spawn(retry_strategy, || {
            with_timeout(timeout, "embedding request", self.request_embedding(&model, input))
        })
        .await
        .map_err(|e| AppError::Upstream(format!("embedding request failed: {e}")))?;

        debug!(dimensions = embedding.len(), "generated embedding");
        Ok(embedding)
    }

    async fn request_embedding(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(model)
            .input([input])
            .build()?;

        let response = self.client.embeddings().create(request).await.map_err(|e| {
            warn!(error = %e, "embedding call failed, may retry");
            AppError::OpenAI(e)
        })?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Upstream("no embedding data received".into()))?
            .embedding;

        Ok(embedding)
    }

    /// Free-form chat completion: system + user message in, raw text out (C2 `complete`).
    pub async fn complete(
        &self,
        config: &AppConfig,
        options: &CompletionOptions,
        system: &str,
        user: &str,
    ) -> Result<String, AppError> {
        let _permit = self.gate.acquire().await;
        let timeout = Duration::from_secs(config.llm_timeout_secs);
        with_timeout(timeout, "chat completion", self.complete_inner(options, system, user)).await
    }

    async fn complete_inner(
        &self,
        options: &CompletionOptions,
        system: &str,
        user: &str,
    ) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&options.model)
            .max_tokens(options.max_tokens)
            .temperature(options.temperature)
            .messages([
                ChatCompletionRequestSystemMessage::from(system).into(),
                ChatCompletionRequestUserMessage::from(user).into(),
            ])
            .build()?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(AppError::OpenAI)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::LlmParsing("no content in LLM response".into()))?;

        debug!(chars = content.len(), "LLM completion received");
        Ok(content)
    }

    /// Schema-constrained chat completion (C2 `complete_structured`): the model is asked to
    /// respond with JSON matching one of three fixed shapes, parsed leniently (first matching
    /// token/JSON; absent ⇒ `LLM_PARSE`).
    pub async fn complete_structured(
        &self,
        config: &AppConfig,
        options: &CompletionOptions,
        system: &str,
        user: &str,
        schema_tag: SchemaTag,
    ) -> Result<StructuredReply, AppError> {
        let timeout = Duration::from_secs(config.llm_timeout_secs);
        with_timeout(timeout, "structured chat completion", self.complete_structured_inner(options, system, user, schema_tag)).await
    }

    async fn complete_structured_inner(
        &self,
        options: &CompletionOptions,
        system: &str,
        user: &str,
        schema_tag: SchemaTag,
    ) -> Result<StructuredReply, AppError> {
        let _permit = self.gate.acquire().await;

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some(schema_description(schema_tag).into()),
                name: schema_name(schema_tag).into(),
                schema: Some(schema_for(schema_tag)),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&options.model)
            .max_tokens(options.max_tokens)
            .temperature(options.temperature)
            .messages([
                ChatCompletionRequestSystemMessage::from(system).into(),
                ChatCompletionRequestUserMessage::from(user).into(),
            ])
            .response_format(response_format)
            .build()?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(AppError::OpenAI)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::LlmParsing("no content in LLM response".into()))?;

        parse_structured(&content, schema_tag)
    }
}

fn schema_name(tag: SchemaTag) -> &'static str {
    match tag {
        SchemaTag::YesNo => "yes_no",
        SchemaTag::Score => "score",
        SchemaTag::QuestionList => "question_list",
    }
}

fn schema_description(tag: SchemaTag) -> &'static str {
    match tag {
        SchemaTag::YesNo => "A single boolean verdict",
        SchemaTag::Score => "A single numeric score in [0, 1]",
        SchemaTag::QuestionList => "A list of self-contained questions",
    }
}

fn schema_for(tag: SchemaTag) -> serde_json::Value {
    match tag {
        SchemaTag::YesNo => json!({
            "type": "object",
            "properties": { "answer": { "type": "boolean" } },
            "required": ["answer"],
            "additionalProperties": false
        }),
        SchemaTag::Score => json!({
            "type": "object",
            "properties": { "score": { "type": "number", "minimum": 0.0, "maximum": 1.0 } },
            "required": ["score"],
            "additionalProperties": false
        }),
        SchemaTag::QuestionList => json!({
            "type": "object",
            "properties": {
                "questions": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["questions"],
            "additionalProperties": false
        }),
    }
}

fn parse_structured(content: &str, tag: SchemaTag) -> Result<StructuredReply, AppError> {
    match tag {
        SchemaTag::YesNo => {
            #[derive(Deserialize)]
            struct Shape {
                answer: bool,
            }
            if let Ok(shape) = serde_json::from_str::<Shape>(content) {
                return Ok(StructuredReply::YesNo(shape.answer));
            }
            // Lenient fallback: look for a bare Yes/No token.
            let lowered = content.to_lowercase();
            if lowered.contains("yes") {
                Ok(StructuredReply::YesNo(true))
            } else if lowered.contains("no") {
                Ok(StructuredReply::YesNo(false))
            } else {
                Err(AppError::LlmParsing(format!(
                    "could not parse yes/no from: {content}"
                )))
            }
        }
        SchemaTag::Score => {
            #[derive(Deserialize)]
            struct Shape {
                score: f32,
            }
            if let Ok(shape) = serde_json::from_str::<Shape>(content) {
                return Ok(StructuredReply::Score(shape.score.clamp(0.0, 1.0)));
            }
            content
                .trim()
                .split_whitespace()
                .find_map(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse::<f32>().ok())
                .map(|v| StructuredReply::Score(v.clamp(0.0, 1.0)))
                .ok_or_else(|| AppError::LlmParsing(format!("could not parse score from: {content}")))
        }
        SchemaTag::QuestionList => {
            #[derive(Deserialize)]
            struct Shape {
                questions: Vec<String>,
            }
            if let Ok(shape) = serde_json::from_str::<Shape>(content) {
                return Ok(StructuredReply::QuestionList(
                    shape
                        .questions
                        .into_iter()
                        .map(|q| q.trim().to_string())
                        .filter(|q| !q.is_empty())
                        .collect(),
                ));
            }
            // Lenient fallback: treat each non-blank line as an enumerated question.
            let questions: Vec<String> = content
                .lines()
                .map(|line| {
                    line.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == '-' || c.is_whitespace())
                        .trim()
                        .to_string()
                })
                .filter(|q| !q.is_empty())
                .collect();
            if questions.is_empty() {
                Err(AppError::LlmParsing(format!(
                    "could not parse question list from: {content}"
                )))
            } else {
                Ok(StructuredReply::QuestionList(questions))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_yes_no_json() {
        let reply = parse_structured(r#"{"answer": true}"#, SchemaTag::YesNo).unwrap();
        assert!(matches!(reply, StructuredReply::YesNo(true)));
    }

    #[test]
    fn falls_back_to_bare_yes_token() {
        let reply = parse_structured("Yes, this chunk is relevant.", SchemaTag::YesNo).unwrap();
        assert!(matches!(reply, StructuredReply::YesNo(true)));
    }

    #[test]
    fn ambiguous_yes_no_is_an_error() {
        let err = parse_structured("maybe", SchemaTag::YesNo).unwrap_err();
        assert!(matches!(err, AppError::LlmParsing(_)));
    }

    #[test]
    fn parses_strict_score_json_and_clamps() {
        let reply = parse_structured(r#"{"score": 1.5}"#, SchemaTag::Score).unwrap();
        match reply {
            StructuredReply::Score(s) => assert!((s - 1.0).abs() < f32::EPSILON),
            _ => panic!("expected score"),
        }
    }

    #[test]
    fn parses_enumerated_question_list_fallback() {
        let reply = parse_structured(
            "1. What is Raft?\n2. How does leader election work?\n",
            SchemaTag::QuestionList,
        )
        .unwrap();
        match reply {
            StructuredReply::QuestionList(qs) => assert_eq!(qs.len(), 2),
            _ => panic!("expected question list"),
        }
    }
}
