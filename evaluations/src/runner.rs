//! Drives the orchestrator against a seeded fixture corpus and scores each case.

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{chunk::Chunk, chunk_embedding::ChunkEmbedding},
    },
    utils::{config::AppConfig, llm::LlmClient},
};
use qa_pipeline::{orchestrator, QueryOptions};
use tracing::info;

use crate::{
    fixture::FixtureCorpus,
    report::{citation_coverage, CaseResult, Report},
};

/// Stores every fixture chunk and its pre-computed embedding, the way the ingestion collaborator
/// would have, so retrieval (C4) sees real rows rather than mocked results.
pub async fn seed_corpus(db: &SurrealDbClient, corpus: &FixtureCorpus) -> Result<(), AppError> {
    for fixture_chunk in &corpus.chunks {
        let chunk = Chunk::new(
            fixture_chunk.text.clone(),
            fixture_chunk.source.clone(),
            "fixture".to_string(),
        );
        let chunk_id = chunk.id.clone();
        db.store_item(chunk).await?;
        db.store_item(ChunkEmbedding::new(chunk_id, fixture_chunk.embedding.clone())).await?;
    }
    Ok(())
}

/// Runs every fixture case through the orchestrator and scores it. Memory is disabled
/// (`use_memory: false`) so repeated cases against the same corpus never short-circuit on a
/// cached answer; each case is independently measured.
pub async fn run(
    db: &SurrealDbClient,
    llm: &LlmClient,
    config: &AppConfig,
    corpus: &FixtureCorpus,
) -> Report {
    let mut results = Vec::with_capacity(corpus.cases.len());

    for case in &corpus.cases {
        let options = QueryOptions {
            use_memory: false,
            ..QueryOptions::default()
        };

        match orchestrator::answer(db, llm, config, &case.question, options).await {
            Ok(response) => {
                let coverage = citation_coverage(&case.expected_sources, &response.references);
                info!(
                    question = %case.question,
                    verification_score = ?response.verification_score,
                    citation_coverage = coverage,
                    "case scored"
                );
                results.push(CaseResult {
                    question: case.question.clone(),
                    answer: response.answer,
                    verification_score: response.verification_score,
                    expected_sources: case.expected_sources.clone(),
                    cited_sources: response.references,
                    citation_coverage: coverage,
                });
            }
            Err(err) => {
                tracing::warn!(question = %case.question, error = %err, "case failed");
                results.push(CaseResult {
                    question: case.question.clone(),
                    answer: String::new(),
                    verification_score: None,
                    expected_sources: case.expected_sources.clone(),
                    cited_sources: Vec::new(),
                    citation_coverage: citation_coverage(&case.expected_sources, &[]),
                });
            }
        }
    }

    Report::from_cases(results)
}
