use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Feedback, "feedback", {
    memory_id: String,
    text: Option<String>,
    rating: Option<u8>,
    favorite: bool,
    has_thread: bool,
    thread_title: Option<String>
});

impl Feedback {
    pub fn new(memory_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            memory_id,
            text: None,
            rating: None,
            favorite: false,
            has_thread: false,
            thread_title: None,
        }
    }

    pub async fn find_by_memory_id(
        db: &SurrealDbClient,
        memory_id: &str,
    ) -> Result<Option<Feedback>, AppError> {
        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT * FROM feedback WHERE memory_id = $memory_id LIMIT 1")
                    .bind(("memory_id", memory_id.to_string()))
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Feedback> = response.take(0).map_err(AppError::Database)?;
        Ok(rows.into_iter().next())
    }

    /// Upserts rating/text/favorite onto the Feedback row bound to `memory_id`, creating it if
    /// absent. At most one Feedback per MemoryEntry (§3).
    pub async fn apply(
        db: &SurrealDbClient,
        memory_id: &str,
        text: Option<String>,
        rating: Option<u8>,
        is_favorite: Option<bool>,
    ) -> Result<Feedback, AppError> {
        let mut feedback = match Self::find_by_memory_id(db, memory_id).await? {
            Some(existing) => existing,
            None => Self::new(memory_id.to_string()),
        };

        if let Some(text) = text {
            feedback.text = Some(text);
        }
        if let Some(rating) = rating {
            feedback.rating = Some(rating);
        }
        if let Some(is_favorite) = is_favorite {
            feedback.favorite = is_favorite;
        }
        feedback.updated_at = Utc::now();

        db.store_item(feedback.clone()).await?;
        Ok(feedback)
    }

    pub async fn favorites(db: &SurrealDbClient) -> Result<Vec<Feedback>, AppError> {
        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT * FROM feedback WHERE favorite = true")
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        response.take(0).map_err(AppError::Database)
    }

    /// Marks this feedback row as owning a thread. Fails with `CONFLICT` if it already does
    /// (§4.12 `create`).
    pub async fn start_thread(
        db: &SurrealDbClient,
        memory_id: &str,
        title: String,
    ) -> Result<Feedback, AppError> {
        let mut feedback = match Self::find_by_memory_id(db, memory_id).await? {
            Some(existing) => existing,
            None => Self::new(memory_id.to_string()),
        };

        if feedback.has_thread {
            return Err(AppError::Conflict(format!(
                "memory entry {memory_id} already has a thread"
            )));
        }

        feedback.has_thread = true;
        feedback.thread_title = Some(title);
        feedback.updated_at = Utc::now();

        db.store_item(feedback.clone()).await?;
        Ok(feedback)
    }

    pub async fn threads(db: &SurrealDbClient) -> Result<Vec<Feedback>, AppError> {
        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT * FROM feedback WHERE has_thread = true")
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        response.take(0).map_err(AppError::Database)
    }

    /// Deletes the Feedback row bound to `memory_id`, if any, returning it so the caller can
    /// cascade into its thread messages (§3 cascade-on-parent-delete).
    pub async fn delete_by_memory_id(
        db: &SurrealDbClient,
        memory_id: &str,
    ) -> Result<Option<Feedback>, AppError> {
        let Some(feedback) = Self::find_by_memory_id(db, memory_id).await? else {
            return Ok(None);
        };
        db.delete_item::<Feedback>(&feedback.id).await?;
        Ok(Some(feedback))
    }

    /// Deletes every Feedback row, for `DELETE /memory/clear` (§3 cascade-on-parent-delete).
    pub async fn delete_all(db: &SurrealDbClient) -> Result<(), AppError> {
        db.with_timeout(async { db.client.query("DELETE feedback").await })
            .await?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }
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
    async fn apply_creates_then_updates_single_row() {
        let db = db().await;
        let memory_id = "mem-1";

        Feedback::apply(&db, memory_id, Some("great".into()), Some(5), Some(true))
            .await
            .expect("first apply");
        let updated = Feedback::apply(&db, memory_id, None, None, Some(false))
            .await
            .expect("second apply");

        assert!(!updated.favorite);
        assert_eq!(updated.rating, Some(5));

        let all = db
            .get_all_stored_items::<Feedback>()
            .await
            .expect("list all");
        assert_eq!(all.len(), 1, "at most one feedback row per memory entry");
    }

    #[tokio::test]
    async fn start_thread_rejects_duplicate() {
        let db = db().await;
        Feedback::start_thread(&db, "mem-2", "first".into())
            .await
            .expect("first thread");

        let err = Feedback::start_thread(&db, "mem-2", "second".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn favorites_only_returns_favorited_entries() {
        let db = db().await;
        Feedback::apply(&db, "mem-a", None, None, Some(true))
            .await
            .expect("favorite a");
        Feedback::apply(&db, "mem-b", None, None, Some(false))
            .await
            .expect("favorite b");

        let favorites = Feedback::favorites(&db).await.expect("favorites");
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].memory_id, "mem-a");
    }
}
