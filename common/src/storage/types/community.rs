use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use serde::Deserialize;

stored_object!(CommunitySummary, "community_summary", {
    community_id: i64,
    summary: String,
    entities: Vec<String>,
    relations: Vec<String>,
    member_count: i64,
    ts: i64
});

/// A community returned for presentation, with its relevance to the queried entity set.
#[derive(Debug, Clone)]
pub struct CommunityHit {
    pub community_id: i64,
    pub summary: String,
    pub entities: Vec<String>,
    pub relevance: f32,
}

impl CommunitySummary {
    async fn latest_ts(db: &SurrealDbClient) -> Result<Option<i64>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            ts: Option<i64>,
        }

        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT math::max(ts) AS ts FROM community_summary GROUP ALL")
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;
        Ok(rows.into_iter().next().and_then(|r| r.ts))
    }

    /// Communities whose member list intersects the given entity ids, in the latest
    /// processing view. Relevance is the fraction of `entity_ids` present in each community.
    /// Advisory: degrades to an empty list on failure (C5).
    pub async fn communities_for_entities(
        db: &SurrealDbClient,
        entity_ids: &[String],
        limit: usize,
    ) -> Result<Vec<CommunityHit>, AppError> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        let Some(ts) = Self::latest_ts(db).await? else {
            return Ok(Vec::new());
        };

        let mut response = db
            .with_timeout(async {
                db.client
                    .query(
                        "SELECT community_id, summary, entities FROM community_summary \
                         WHERE ts = $ts AND entities CONTAINSANY $entity_ids",
                    )
                    .bind(("ts", ts))
                    .bind(("entity_ids", entity_ids.to_vec()))
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        #[derive(Deserialize)]
        struct Row {
            community_id: i64,
            summary: String,
            entities: Vec<String>,
        }

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;
        let query_set: std::collections::HashSet<&String> = entity_ids.iter().collect();

        let mut hits: Vec<CommunityHit> = rows
            .into_iter()
            .map(|r| {
                let overlap = r.entities.iter().filter(|e| query_set.contains(e)).count();
                #[allow(clippy::cast_precision_loss)]
                let relevance = overlap as f32 / entity_ids.len() as f32;
                CommunityHit {
                    community_id: r.community_id,
                    summary: r.summary,
                    entities: r.entities,
                    relevance,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn communities_for_entities_returns_empty_without_graph() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let hits = CommunitySummary::communities_for_entities(&db, &["raft".into()], 5)
            .await
            .expect("should degrade gracefully");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn communities_for_entities_computes_relevance() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let now = chrono::Utc::now();
        db.store_item(CommunitySummary {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            community_id: 1,
            summary: "Consensus algorithms".into(),
            entities: vec!["raft".into(), "paxos".into()],
            relations: vec![],
            member_count: 2,
            ts: 1,
        })
        .await
        .expect("store community");

        let hits = CommunitySummary::communities_for_entities(&db, &["raft".into()], 5)
            .await
            .expect("communities_for_entities");
        assert_eq!(hits.len(), 1);
        assert!((hits[0].relevance - 1.0).abs() < f32::EPSILON);
    }
}
