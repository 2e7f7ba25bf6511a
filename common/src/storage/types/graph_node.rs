use crate::stored_object;
use serde::{Deserialize, Serialize};

/// Tags a `GraphNode` as either an extracted entity or a chunk that feeds the graph view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphNodeKind {
    Entity { entity_type: String },
    Chunk,
}

stored_object!(GraphNode, "graph_node", {
    node_id: String,
    kind: GraphNodeKind,
    text: Option<String>,
    source: Option<String>,
    ts: i64
});

impl GraphNode {
    pub fn entity(node_id: String, entity_type: String, text: String, ts: i64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            node_id,
            kind: GraphNodeKind::Entity { entity_type },
            text: Some(text),
            source: None,
            ts,
        }
    }
}
