//! Fixture corpus: a small, versioned JSON file of pre-embedded chunks and test questions. The
//! embeddings are computed once (offline, against the real embedding model) and cached in the
//! fixture file itself, the way the upstream system's corpus manifests cache ingestion output
//! rather than re-embedding on every run.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureChunk {
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCase {
    pub question: String,
    /// Source descriptors the answer is expected to cite, used for citation-coverage scoring.
    #[serde(default)]
    pub expected_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCorpus {
    pub chunks: Vec<FixtureChunk>,
    pub cases: Vec<FixtureCase>,
}

impl FixtureCorpus {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture corpus at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing fixture corpus at {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_well_formed_fixture_file() {
        let dir = std::env::temp_dir().join(format!("eval-fixture-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("tmp dir");
        let path = dir.join("corpus.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "chunks": [
                    {"source": "raft-paper", "text": "Raft elects a leader.", "embedding": [1.0, 0.0]}
                ],
                "cases": [
                    {"question": "what is raft", "expected_sources": ["raft-paper"]}
                ]
            })
            .to_string(),
        )
        .expect("write fixture");

        let corpus = FixtureCorpus::load(&path).expect("load fixture");
        assert_eq!(corpus.chunks.len(), 1);
        assert_eq!(corpus.cases.len(), 1);
        assert_eq!(corpus.cases[0].expected_sources, vec!["raft-paper"]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
