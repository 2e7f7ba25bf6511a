//! Graph enricher (C5): advisory presentation enrichment over a set of chunks. Any failure
//! degrades to empty lists and never fails the pipeline (§4.5, §9).

use common::storage::{
    db::SurrealDbClient,
    types::{community::CommunitySummary, graph_edge::GraphEdge},
};
use tracing::warn;

const DEFAULT_ENTITY_LIMIT: usize = 10;
const DEFAULT_COMMUNITY_LIMIT: usize = 5;

#[derive(Debug, Clone, serde::Serialize)]
pub struct EntityPresentation {
    pub entity: String,
    pub entity_type: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CommunityPresentation {
    pub community_id: i64,
    pub summary: String,
    pub entities: Vec<String>,
    pub relevance: f32,
}

/// Looks up entities and communities associated with `chunk_ids` for response presentation.
/// Both stages degrade to an empty vector on any store error instead of propagating it.
pub async fn enrich(
    db: &SurrealDbClient,
    chunk_ids: &[String],
) -> (Vec<EntityPresentation>, Vec<CommunityPresentation>) {
    let entities = match GraphEdge::entities_for_chunks(db, chunk_ids, DEFAULT_ENTITY_LIMIT).await {
        Ok(hits) => hits
            .into_iter()
            .map(|hit| EntityPresentation {
                entity: hit.entity_id,
                entity_type: hit.entity_type,
                relevance: hit.score,
            })
            .collect::<Vec<_>>(),
        Err(err) => {
            warn!(error = %err, "graph enrichment (entities) failed, degrading to empty");
            Vec::new()
        }
    };

    if entities.is_empty() {
        return (entities, Vec::new());
    }

    let entity_ids: Vec<String> = entities.iter().map(|e| e.entity.clone()).collect();
    let communities = match CommunitySummary::communities_for_entities(
        db,
        &entity_ids,
        DEFAULT_COMMUNITY_LIMIT,
    )
    .await
    {
        Ok(hits) => hits
            .into_iter()
            .map(|hit| CommunityPresentation {
                community_id: hit.community_id,
                summary: hit.summary,
                entities: hit.entities,
                relevance: hit.relevance,
            })
            .collect(),
        Err(err) => {
            warn!(error = %err, "graph enrichment (communities) failed, degrading to empty");
            Vec::new()
        }
    };

    (entities, communities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn enrich_degrades_to_empty_without_a_graph() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let (entities, communities) = enrich(&db, &["chunk-1".to_string()]).await;
        assert!(entities.is_empty());
        assert!(communities.is_empty());
    }
}
