use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use serde::Deserialize;

stored_object!(GraphEdge, "graph_edge", {
    src: String,
    dst: String,
    weight: f32,
    relation: Option<String>,
    ts: i64
});

/// An entity incident to one of the queried chunks, with an aggregated relevance score.
#[derive(Debug, Clone)]
pub struct EntityHit {
    pub entity_id: String,
    pub entity_type: String,
    pub score: f32,
}

impl GraphEdge {
    /// Looks up the latest processing timestamp over the graph edge table. Returns `None` if
    /// the graph has never been built.
    async fn latest_ts(db: &SurrealDbClient) -> Result<Option<i64>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            ts: Option<i64>,
        }

        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT math::max(ts) AS ts FROM graph_edge GROUP ALL")
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;
        Ok(rows.into_iter().next().and_then(|r| r.ts))
    }

    /// Aggregates incident entities for a set of chunk ids in the latest graph view (C5).
    /// Score is the sum of incident edge weights, truncated to the top `limit` entities.
    /// Advisory: any failure here should be swallowed by the caller into an empty list.
    pub async fn entities_for_chunks(
        db: &SurrealDbClient,
        chunk_ids: &[String],
        limit: usize,
    ) -> Result<Vec<EntityHit>, AppError> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let Some(ts) = Self::latest_ts(db).await? else {
            return Ok(Vec::new());
        };

        // Aggregate weights per destination node, then resolve each node's entity type.
        #[derive(Deserialize)]
        struct AggRow {
            entity_id: String,
            score: f32,
        }

        let mut agg_response = db
            .with_timeout(async {
                db.client
                    .query(
                        "SELECT dst AS entity_id, math::sum(weight) AS score FROM graph_edge \
                         WHERE src IN $chunk_ids AND ts = $ts GROUP BY entity_id ORDER BY score DESC LIMIT $limit",
                    )
                    .bind(("chunk_ids", chunk_ids.to_vec()))
                    .bind(("ts", ts))
                    .bind(("limit", limit as i64))
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        let agg_rows: Vec<AggRow> = agg_response.take(0).map_err(AppError::Database)?;

        let mut hits = Vec::with_capacity(agg_rows.len());
        for row in agg_rows {
            let mut node_resp = db
                .with_timeout(async {
                    db.client
                        .query("SELECT kind FROM graph_node WHERE node_id = $node_id LIMIT 1")
                        .bind(("node_id", row.entity_id.clone()))
                        .await
                })
                .await?;

            #[derive(Deserialize)]
            struct KindRow {
                kind: crate::storage::types::graph_node::GraphNodeKind,
            }
            let kind_rows: Vec<KindRow> = node_resp.take(0).unwrap_or_default();
            let entity_type = kind_rows
                .into_iter()
                .next()
                .map(|k| match k.kind {
                    crate::storage::types::graph_node::GraphNodeKind::Entity { entity_type } => {
                        entity_type
                    }
                    crate::storage::types::graph_node::GraphNodeKind::Chunk => "UNKNOWN".into(),
                })
                .unwrap_or_else(|| "UNKNOWN".into());

            hits.push(EntityHit {
                entity_id: row.entity_id,
                entity_type,
                score: row.score,
            });
        }

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::graph_node::GraphNode;
    use uuid::Uuid;

    #[tokio::test]
    async fn entities_for_chunks_returns_empty_without_graph() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let hits = GraphEdge::entities_for_chunks(&db, &["chunk-1".into()], 10)
            .await
            .expect("entities_for_chunks should degrade gracefully");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn entities_for_chunks_aggregates_weights() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        db.store_item(GraphNode::entity(
            "raft".into(),
            "CONCEPT".into(),
            "Raft".into(),
            1,
        ))
        .await
        .expect("store node");

        let edge = GraphEdge {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            src: "chunk-1".into(),
            dst: "raft".into(),
            weight: 0.8,
            relation: Some("mentions".into()),
            ts: 1,
        };
        db.store_item(edge).await.expect("store edge");

        let hits = GraphEdge::entities_for_chunks(&db, &["chunk-1".into()], 10)
            .await
            .expect("entities_for_chunks");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, "raft");
    }
}
