use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::chunk::Chunk},
    stored_object,
};
use serde::Deserialize;

stored_object!(ChunkEmbedding, "chunk_embedding", {
    chunk_id: String,
    embedding: Vec<f32>
});

/// A chunk paired with its cosine similarity to some query vector, the unit C4 returns.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

impl ChunkEmbedding {
    pub fn new(chunk_id: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: chunk_id.clone(),
            created_at: now,
            updated_at: now,
            chunk_id,
            embedding,
        }
    }

    /// Cosine-similarity nearest neighbor search over chunk embeddings (C4). Returns chunks
    /// ordered by descending similarity, ties broken by ascending chunk id (§5 ordering
    /// guarantee).
    pub async fn vector_search(
        db: &SurrealDbClient,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            chunk_id: Chunk,
            score: f32,
        }

        let sql = format!(
            r#"
            SELECT
                chunk_id,
                vector::similarity::cosine(embedding, $embedding) AS score
            FROM chunk_embedding
            WHERE embedding <|{k},100|> $embedding
            ORDER BY score DESC
            LIMIT {k}
            FETCH chunk_id;
            "#
        );

        let mut response = db
            .with_timeout(async {
                db.client
                    .query(sql)
                    .bind(("embedding", query_embedding.to_vec()))
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;

        let mut scored: Vec<ScoredChunk> = rows
            .into_iter()
            .map(|r| ScoredChunk {
                chunk: r.chunk_id,
                similarity: r.score,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });

        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::chunk::Chunk;
    use uuid::Uuid;

    async fn seeded_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");
        db
    }

    async fn seed_chunk(db: &SurrealDbClient, source: &str, embedding: Vec<f32>) -> Chunk {
        let chunk = Chunk::new(format!("text of {source}"), source.into(), "hash".into());
        db.store_item(chunk.clone()).await.expect("store chunk");
        db.store_item(ChunkEmbedding::new(chunk.id.clone(), embedding))
            .await
            .expect("store embedding");
        chunk
    }

    #[tokio::test]
    async fn vector_search_orders_by_similarity_desc() {
        let db = seeded_db().await;
        let far = seed_chunk(&db, "far", vec![0.0, 1.0, 0.0]).await;
        let near = seed_chunk(&db, "near", vec![1.0, 0.0, 0.0]).await;

        let results = ChunkEmbedding::vector_search(&db, &[1.0, 0.0, 0.0], 2)
            .await
            .expect("vector search");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, near.id);
        assert_eq!(results[1].chunk.id, far.id);
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[tokio::test]
    async fn vector_search_breaks_ties_by_ascending_chunk_id() {
        let db = seeded_db().await;
        let a = seed_chunk(&db, "a", vec![1.0, 0.0, 0.0]).await;
        let b = seed_chunk(&db, "b", vec![1.0, 0.0, 0.0]).await;

        let results = ChunkEmbedding::vector_search(&db, &[1.0, 0.0, 0.0], 2)
            .await
            .expect("vector search");

        assert_eq!(results.len(), 2);
        let (first, second) = if a.id < b.id { (a, b) } else { (b, a) };
        assert_eq!(results[0].chunk.id, first.id);
        assert_eq!(results[1].chunk.id, second.id);
    }
}
