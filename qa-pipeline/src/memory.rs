//! Memory cache (C6): exact + semantic match lookup and insert of past (question → answer)
//! pairs, with access accounting (§4.6).

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{chunk::Chunk, memory_entry::MemoryEntry},
    },
};
use tracing::instrument;

/// A memory hit, re-hydrated for return to the caller: chunks are re-fetched at read time so
/// the cached answer's supporting text stays fresh even if the cache entry is old (§4.6).
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub entry: MemoryEntry,
    pub chunks: Vec<Chunk>,
}

async fn hydrate_hit(db: &SurrealDbClient, entry: MemoryEntry) -> Result<MemoryHit, AppError> {
    MemoryEntry::touch(db, &entry.id).await?;
    let mut touched = entry;
    touched.access_count += 1;

    let chunks = Chunk::fetch_many(&touched.chunk_ids, db).await.unwrap_or_default();

    Ok(MemoryHit {
        entry: touched,
        chunks,
    })
}

/// Exact-match lookup on normalized text only (§4.6 policy a). Deliberately does not require an
/// embedding, so an exact hit short-circuits the pipeline before any embedder or LLM call is
/// made (§8 scenario S1).
#[instrument(skip_all, fields(question_len = question.len()))]
pub async fn lookup_exact(db: &SurrealDbClient, question: &str) -> Result<Option<MemoryHit>, AppError> {
    match MemoryEntry::lookup_exact(db, question).await? {
        Some(entry) => Ok(Some(hydrate_hit(db, entry).await?)),
        None => Ok(None),
    }
}

/// Semantic-match lookup at `similarity_threshold` over an already-computed question embedding
/// (§4.6 policy b).
#[instrument(skip_all)]
pub async fn lookup_semantic(
    db: &SurrealDbClient,
    question_embedding: &[f32],
    similarity_threshold: f32,
) -> Result<Option<MemoryHit>, AppError> {
    match MemoryEntry::lookup_semantic(db, question_embedding, similarity_threshold).await? {
        Some(entry) => Ok(Some(hydrate_hit(db, entry).await?)),
        None => Ok(None),
    }
}

/// Inserts a freshly synthesized answer, deduplicating concurrent identical misses via the
/// unique normalized-text index (§4.6 concurrency rule, §4.3 `memory_insert`).
#[instrument(skip_all)]
pub async fn insert(
    db: &SurrealDbClient,
    question: String,
    question_embedding: Vec<f32>,
    answer: String,
    refs: Vec<String>,
    chunk_ids: Vec<String>,
    entities: Vec<String>,
    communities: Vec<i64>,
) -> Result<MemoryEntry, AppError> {
    let entry = MemoryEntry::new(
        question,
        question_embedding,
        answer,
        refs,
        chunk_ids,
        entities,
        communities,
    );
    MemoryEntry::insert_or_touch(db, entry).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn lookup_exact_misses_on_empty_store() {
        let db = db().await;
        let hit = lookup_exact(&db, "what is raft").await.expect("lookup");
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn lookup_exact_hit_increments_access_count() {
        let db = db().await;
        insert(
            &db,
            "what is raft consensus".into(),
            vec![1.0, 0.0],
            "Raft is a consensus algorithm.".into(),
            vec![],
            vec![],
            vec![],
            vec![],
        )
        .await
        .expect("insert");

        let hit = lookup_exact(&db, "what is raft consensus")
            .await
            .expect("lookup")
            .expect("hit");
        assert_eq!(hit.entry.access_count, 1);

        let hit_again = lookup_exact(&db, "what is raft consensus")
            .await
            .expect("lookup")
            .expect("hit");
        assert_eq!(hit_again.entry.access_count, 2);
    }

    #[tokio::test]
    async fn lookup_semantic_respects_threshold() {
        let db = db().await;
        insert(
            &db,
            "what is raft consensus".into(),
            vec![1.0, 0.0, 0.0],
            "Raft is a consensus algorithm.".into(),
            vec![],
            vec![],
            vec![],
            vec![],
        )
        .await
        .expect("insert");

        let hit = lookup_semantic(&db, &[1.0, 0.0, 0.0], 0.95)
            .await
            .expect("lookup");
        assert!(hit.is_some());

        let miss = lookup_semantic(&db, &[0.0, 1.0, 0.0], 0.95)
            .await
            .expect("lookup");
        assert!(miss.is_none());
    }
}
