use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use serde::Deserialize;

stored_object!(ThreadMessage, "thread_message", {
    feedback_id: String,
    seq: i64,
    text: String,
    is_user: bool,
    refs: Option<Vec<String>>,
    chunk_ids: Option<Vec<String>>
});

impl ThreadMessage {
    /// `seq` must come from `next_seq`, called under the per-thread lock (§5), and becomes both
    /// the ordering key and (zero-padded into `id`) the externally visible, strictly increasing
    /// message id §8 invariant 6 requires. The `feedback_id` prefix keeps ids unique across
    /// threads sharing the table.
    pub fn new(
        feedback_id: String,
        seq: i64,
        text: String,
        is_user: bool,
        refs: Option<Vec<String>>,
        chunk_ids: Option<Vec<String>>,
    ) -> Self {
        let now = Utc::now();
        let id = format!("{feedback_id}:{seq:020}");
        Self {
            id,
            created_at: now,
            updated_at: now,
            feedback_id,
            seq,
            text,
            is_user,
            refs,
            chunk_ids,
        }
    }

    /// The next monotonic `seq` for `feedback_id` (§4.12, §8 invariant 6): one past the current
    /// max, or `1` if the thread has no messages yet. Callers must hold the per-thread lock
    /// (§5) around the read-then-write this enables, or two concurrent appends can compute the
    /// same seq.
    pub async fn next_seq(db: &SurrealDbClient, feedback_id: &str) -> Result<i64, AppError> {
        #[derive(Deserialize)]
        struct Row {
            max_seq: Option<i64>,
        }

        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT math::max(seq) AS max_seq FROM thread_message WHERE feedback_id = $feedback_id GROUP ALL")
                    .bind(("feedback_id", feedback_id.to_string()))
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        let rows: Vec<Row> = response.take(0).map_err(AppError::Database)?;
        Ok(rows.into_iter().next().and_then(|r| r.max_seq).unwrap_or(0) + 1)
    }

    /// All messages for a thread, ordered by the monotonic `seq` assigned at append time (§4.12
    /// `list`). `id` is zero-padded from the same `seq`, so this is also ascending-id order —
    /// the ordering §8 invariant 6 requires of `GET /thread/{id}`.
    pub async fn list(
        db: &SurrealDbClient,
        feedback_id: &str,
    ) -> Result<Vec<ThreadMessage>, AppError> {
        let mut response = db
            .with_timeout(async {
                db.client
                    .query("SELECT * FROM thread_message WHERE feedback_id = $feedback_id ORDER BY seq ASC")
                    .bind(("feedback_id", feedback_id.to_string()))
                    .await
            })
            .await?
            .check()
            .map_err(AppError::Database)?;

        response.take(0).map_err(AppError::Database)
    }

    /// Deletes every message bound to `feedback_id` (§3 cascade-on-parent-delete).
    pub async fn delete_by_feedback_id(
        db: &SurrealDbClient,
        feedback_id: &str,
    ) -> Result<(), AppError> {
        db.with_timeout(async {
            db.client
                .query("DELETE thread_message WHERE feedback_id = $feedback_id")
                .bind(("feedback_id", feedback_id.to_string()))
                .await
        })
        .await?
        .check()
        .map_err(AppError::Database)?;
        Ok(())
    }

    /// Deletes every thread message, for `DELETE /memory/clear` (§3 cascade-on-parent-delete).
    pub async fn delete_all(db: &SurrealDbClient) -> Result<(), AppError> {
        db.with_timeout(async { db.client.query("DELETE thread_message").await })
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

    #[tokio::test]
    async fn list_returns_messages_in_creation_order() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let feedback_id = "thread-1";
        let first = ThreadMessage::new(feedback_id.into(), 1, "hello".into(), true, None, None);
        db.store_item(first.clone()).await.expect("store first");

        let second = ThreadMessage::new(feedback_id.into(), 2, "hi there".into(), false, None, None);
        db.store_item(second.clone()).await.expect("store second");

        let listed = ThreadMessage::list(&db, feedback_id)
            .await
            .expect("list thread");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
        assert!(listed[0].id < listed[1].id, "ids must be strictly increasing");
    }

    #[tokio::test]
    async fn next_seq_starts_at_one_and_increments() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let feedback_id = "thread-2";
        let first_seq = ThreadMessage::next_seq(&db, feedback_id)
            .await
            .expect("next_seq");
        assert_eq!(first_seq, 1);

        let message = ThreadMessage::new(feedback_id.into(), first_seq, "hi".into(), true, None, None);
        db.store_item(message).await.expect("store message");

        let second_seq = ThreadMessage::next_seq(&db, feedback_id)
            .await
            .expect("next_seq");
        assert_eq!(second_seq, 2);
    }
}
