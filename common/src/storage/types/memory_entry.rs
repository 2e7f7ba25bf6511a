use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use serde::Deserialize;

stored_object!(MemoryEntry, "memory", {
    text: String,
    normalized_text: String,
    embedding: Vec<f32>,
    answer: String,
    refs: Vec<String>,
    chunk_ids: Vec<String>,
    entities: Vec<String>,
    communities: Vec<i64>,
    access_count: i64,
    last_accessed: DateTime<Utc>
});

/// Trims, collapses internal whitespace, and case-folds a question for the exact-match key
/// (§4.6).
pub fn normalize_question(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl MemoryEntry {
    pub fn new(
        text: String,
        embedding: Vec<f32>,
        answer: String,
        refs: Vec<String>,
        chunk_ids: Vec<String>,
        entities: Vec<String>,
        communities: Vec<i64>,
    ) -> Self {
        let now = Utc::now();
        let normalized_text = normalize_question(&text);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            text,
            normalized_text,
            embedding,
            answer,
            refs,
            chunk_ids,
            entities,
            communities,
            access_count: 0,
            last_accessed: now,
        }
    }

    /// Exact-match lookup on the normalized text (§4.6a).
    pub async fn lookup_exact(
        db: &SurrealDbClient,
        question: &str,
    ) -> Result<Option<MemoryEntry>, AppError> {
        let normalized = normalize_question(question);
        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT * FROM memory WHERE normalized_text = $normalized LIMIT 1")
                    .bind(("normalized", normalized))
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<MemoryEntry> = response.take(0).map_err(AppError::Database)?;
        Ok(rows.into_iter().next())
    }

    /// Semantic-match lookup: cosine similarity ≥ `threshold`, highest first, ties by most
    /// recent (§4.6b).
    pub async fn lookup_semantic(
        db: &SurrealDbClient,
        query_embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<MemoryEntry>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            #[serde(flatten)]
            entry: MemoryEntry,
            score: f32,
        }

        let mut response = db
            .with_timeout(async {
                db.client
                    .query(
                        "SELECT *, vector::similarity::cosine(embedding, $embedding) AS score \
                         FROM memory WHERE embedding <|50,100|> $embedding",
                    )
                    .bind(("embedding", query_embedding.to_vec()))
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;

        let best = rows
            .into_iter()
            .filter(|r| r.score >= threshold)
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.entry.last_accessed.cmp(&b.entry.last_accessed))
            });

        Ok(best.map(|r| r.entry))
    }

    /// Inserts a new entry, guarding against a concurrent identical insert via the unique
    /// index on `normalized_text`: the loser's `CREATE` fails with an index violation, at which
    /// point it re-reads the winner's row and performs a touch instead of creating a duplicate
    /// (§4.6 concurrency rule).
    pub async fn insert_or_touch(
        db: &SurrealDbClient,
        entry: MemoryEntry,
    ) -> Result<MemoryEntry, AppError> {
        let created = tokio::time::timeout(
            db.timeout_duration(),
            db.client
                .query("CREATE type::thing('memory', $id) CONTENT $content")
                .bind(("id", entry.id.clone()))
                .bind(("content", entry.clone())),
        )
        .await;

        match created {
            Ok(Ok(mut response)) => {
                let rows: Vec<MemoryEntry> = response.take(0).map_err(AppError::Database)?;
                rows.into_iter()
                    .next()
                    .ok_or_else(|| AppError::Store("memory insert produced no row".into()))
            }
            Ok(Err(_)) => {
                // Another writer won the race on the unique normalized_text index; touch its
                // row instead of failing the request.
                let existing = Self::lookup_exact(db, &entry.text)
                    .await?
                    .ok_or_else(|| {
                        AppError::Store(
                            "memory insert conflicted but no existing row was found".into(),
                        )
                    })?;
                Self::touch(db, &existing.id).await?;
                let mut refreshed = existing.clone();
                refreshed.access_count += 1;
                Ok(refreshed)
            }
            Err(_) => Err(AppError::Timeout(
                "memory insert exceeded its per-call database timeout".into(),
            )),
        }
    }

    /// Increments access_count and bumps last_accessed (§4.3).
    pub async fn touch(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.with_timeout(async {
            db.client
                .query("UPDATE type::thing('memory', $id) SET access_count += 1, last_accessed = time::now()")
                .bind(("id", id.to_string()))
                .await
        })
        .await?
        .check()
        .map_err(AppError::Database)?;
        Ok(())
    }

    /// Deletes every MemoryEntry row, for `DELETE /memory/clear`. Cascades into the bound
    /// Feedback and ThreadMessage rows (§3 cascade-on-parent-delete); callers that need the
    /// full cascade should go through `qa_pipeline::orchestrator::memory_clear` rather than
    /// this method alone.
    pub async fn clear_all(db: &SurrealDbClient) -> Result<(), AppError> {
        db.with_timeout(async { db.client.query("DELETE memory").await })
            .await?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn stats(db: &SurrealDbClient) -> Result<MemoryStats, AppError> {
        #[derive(Deserialize)]
        struct Row {
            count: i64,
            total_accesses: Option<i64>,
        }

        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT count() AS count, math::sum(access_count) AS total_accesses FROM memory GROUP ALL")
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;
        let row = rows.into_iter().next();
        Ok(MemoryStats {
            entry_count: row.as_ref().map_or(0, |r| r.count),
            total_accesses: row.and_then(|r| r.total_accesses).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryStats {
    pub entry_count: i64,
    pub total_accesses: i64,
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

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_question("  What IS   Raft Consensus?  "),
            "what is raft consensus?"
        );
    }

    #[tokio::test]
    async fn lookup_exact_matches_normalized_text() {
        let db = db().await;
        let entry = MemoryEntry::new(
            "What is raft consensus".into(),
            vec![1.0, 0.0],
            "Raft is a consensus algorithm.".into(),
            vec![],
            vec![],
            vec![],
            vec![],
        );
        db.store_item(entry.clone()).await.expect("store entry");

        let found = MemoryEntry::lookup_exact(&db, "  what is   RAFT consensus  ")
            .await
            .expect("lookup")
            .expect("found");
        assert_eq!(found.id, entry.id);
    }

    #[tokio::test]
    async fn lookup_semantic_respects_threshold() {
        let db = db().await;
        let entry = MemoryEntry::new(
            "what is raft consensus".into(),
            vec![1.0, 0.0, 0.0],
            "Raft is a consensus algorithm.".into(),
            vec![],
            vec![],
            vec![],
            vec![],
        );
        db.store_item(entry.clone()).await.expect("store entry");

        let hit = MemoryEntry::lookup_semantic(&db, &[1.0, 0.0, 0.0], 0.95)
            .await
            .expect("lookup");
        assert!(hit.is_some());

        let miss = MemoryEntry::lookup_semantic(&db, &[0.0, 1.0, 0.0], 0.95)
            .await
            .expect("lookup");
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn insert_or_touch_deduplicates_identical_misses() {
        let db = db().await;
        let entry = MemoryEntry::new(
            "what is raft consensus".into(),
            vec![1.0, 0.0],
            "Raft is a consensus algorithm.".into(),
            vec![],
            vec![],
            vec![],
            vec![],
        );

        let first = MemoryEntry::insert_or_touch(&db, entry.clone())
            .await
            .expect("first insert");

        let duplicate = MemoryEntry::new(
            "What Is Raft Consensus".into(),
            vec![1.0, 0.0],
            "A different answer text".into(),
            vec![],
            vec![],
            vec![],
            vec![],
        );
        let second = MemoryEntry::insert_or_touch(&db, duplicate)
            .await
            .expect("second insert touches instead of duplicating");

        assert_eq!(first.id, second.id);
        assert_eq!(second.access_count, 1);

        let all = db
            .get_all_stored_items::<MemoryEntry>()
            .await
            .expect("list all");
        assert_eq!(all.len(), 1);
    }
}
