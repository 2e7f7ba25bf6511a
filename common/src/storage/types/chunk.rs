use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Chunk, "chunk", {
    text: String,
    source: String,
    path: Option<String>,
    page: Option<u32>,
    offset: Option<u32>,
    ocr: bool,
    hash: String
});

impl Chunk {
    /// Constructs a chunk the way the ingestion collaborator would, for fixtures and tests.
    /// The core itself never creates chunks. `source` is the document descriptor used to
    /// build citation references; `text` is the passage content fed to prompts.
    pub fn new(text: String, source: String, hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            text,
            source,
            path: None,
            page: None,
            offset: None,
            ocr: false,
            hash,
        }
    }

    pub async fn fetch_many(ids: &[String], db: &SurrealDbClient) -> Result<Vec<Chunk>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT * FROM chunk WHERE id IN $ids")
                    .bind(("ids", ids.to_vec()))
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        response.take(0).map_err(AppError::Database)
    }

    pub async fn fetch_one(id: &str, db: &SurrealDbClient) -> Result<Chunk, AppError> {
        db.get_item::<Chunk>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chunk {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn fetch_many_preserves_requested_ids() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let c1 = Chunk::new("text a".into(), "doc-a".into(), "hash-a".into());
        let c2 = Chunk::new("text b".into(), "doc-b".into(), "hash-b".into());
        db.store_item(c1.clone()).await.expect("store c1");
        db.store_item(c2.clone()).await.expect("store c2");

        let fetched = Chunk::fetch_many(&[c1.id.clone(), c2.id.clone()], &db)
            .await
            .expect("fetch many");
        assert_eq!(fetched.len(), 2);
    }

    #[tokio::test]
    async fn fetch_one_missing_is_not_found() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let err = Chunk::fetch_one("does-not-exist", &db).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
