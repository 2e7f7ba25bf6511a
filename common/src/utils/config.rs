use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Process-wide configuration, loaded once at startup and handed out as an
/// `Arc<AppConfig>`. Every tunable a stage needs travels through here rather
/// than through ad-hoc `env::var` calls scattered across the pipeline.
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_true")]
    pub enable_memory: bool,
    #[serde(default = "default_memory_similarity_threshold")]
    pub memory_similarity_threshold: f32,
    #[serde(default = "default_true")]
    pub enable_chunk_classification: bool,
    #[serde(default = "default_true")]
    pub enable_subquestion_amplification: bool,
    #[serde(default = "default_true")]
    pub enable_answer_verification: bool,
    #[serde(default = "default_chunk_relevance_threshold")]
    pub chunk_relevance_threshold: f32,
    #[serde(default = "default_verification_threshold")]
    pub verification_threshold: f32,
    #[serde(default = "default_max_subquestions")]
    pub max_subquestions: usize,
    #[serde(default = "default_amplification_min_context_length")]
    pub amplification_min_context_length: usize,
    #[serde(default = "default_min_keep")]
    pub min_keep: usize,

    #[serde(default = "default_classify_concurrency")]
    pub classify_concurrency: usize,
    #[serde(default = "default_subq_concurrency")]
    pub subq_concurrency: usize,
    #[serde(default = "default_llm_max_inflight")]
    pub llm_max_inflight: usize,

    #[serde(default = "default_true")]
    pub enable_dialog_retrieval: bool,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_db_timeout_secs")]
    pub db_timeout_secs: u64,
    #[serde(default = "default_pipeline_deadline_secs")]
    pub pipeline_deadline_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_memory_similarity_threshold() -> f32 {
    0.95
}
fn default_chunk_relevance_threshold() -> f32 {
    0.5
}
fn default_verification_threshold() -> f32 {
    0.7
}
fn default_max_subquestions() -> usize {
    4
}
fn default_amplification_min_context_length() -> usize {
    500
}
fn default_min_keep() -> usize {
    2
}
fn default_classify_concurrency() -> usize {
    8
}
fn default_subq_concurrency() -> usize {
    4
}
fn default_llm_max_inflight() -> usize {
    16
}
fn default_llm_timeout_secs() -> u64 {
    30
}
fn default_embedding_timeout_secs() -> u64 {
    10
}
fn default_db_timeout_secs() -> u64 {
    5
}
fn default_pipeline_deadline_secs() -> u64 {
    60
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        assert_eq!(default_http_port(), 8080);
        assert!((default_memory_similarity_threshold() - 0.95).abs() < f32::EPSILON);
        assert!((default_verification_threshold() - 0.7).abs() < f32::EPSILON);
        assert_eq!(default_max_subquestions(), 4);
        assert_eq!(default_amplification_min_context_length(), 500);
        assert_eq!(default_min_keep(), 2);
        assert_eq!(default_classify_concurrency(), 8);
        assert_eq!(default_subq_concurrency(), 4);
        assert_eq!(default_llm_max_inflight(), 16);
    }
}
