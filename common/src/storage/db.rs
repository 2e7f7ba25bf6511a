use crate::error::AppError;

use super::types::StoredObject;
use futures::Stream;
use std::{ops::Deref, sync::Arc, time::Duration};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Notification, Surreal,
};

/// Default per-call database timeout for connections constructed outside `AppConfig` (tests,
/// the `Dummy` fixtures). Production connections use `AppConfig::db_timeout_secs` instead.
const DEFAULT_DB_TIMEOUT: Duration = Duration::from_secs(5);

/// Wraps a connected SurrealDB handle. Every stage that touches persistence goes through
/// this type rather than holding its own connection.
#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
    db_timeout: Duration,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
        db_timeout_secs: u64,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient {
            client: db,
            db_timeout: Duration::from_secs(db_timeout_secs),
        })
    }

    /// The configured per-call timeout, for call sites that need to distinguish a timeout from
    /// an ordinary query error (e.g. conflict detection on a unique index).
    pub(crate) fn timeout_duration(&self) -> Duration {
        self.db_timeout
    }

    /// Bounds a future representing a single outbound database call to the configured per-call
    /// timeout (§5), turning an elapsed deadline into `AppError::Timeout`.
    pub(crate) async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, surrealdb::Error>>,
    ) -> Result<T, AppError> {
        tokio::time::timeout(self.db_timeout, fut)
            .await
            .map_err(|_| AppError::Timeout("database call exceeded its per-call timeout".into()))?
            .map_err(AppError::Database)
    }

    /// Defines every table and index the query-answering core reads or writes.
    /// Idempotent: safe to call on every startup.
    pub async fn apply_migrations(&self) -> Result<(), AppError> {
        self.client
            .query(
                r#"
                DEFINE TABLE IF NOT EXISTS chunk SCHEMALESS;
                DEFINE TABLE IF NOT EXISTS chunk_embedding SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_chunk_embedding_vector ON TABLE chunk_embedding
                    FIELDS embedding HNSW DIMENSION 1536;
                DEFINE INDEX IF NOT EXISTS idx_chunk_embedding_chunk ON TABLE chunk_embedding FIELDS chunk_id;

                DEFINE TABLE IF NOT EXISTS graph_node SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_graph_node_ts ON TABLE graph_node FIELDS ts;
                DEFINE TABLE IF NOT EXISTS graph_edge SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_graph_edge_src ON TABLE graph_edge FIELDS src;
                DEFINE INDEX IF NOT EXISTS idx_graph_edge_dst ON TABLE graph_edge FIELDS dst;
                DEFINE INDEX IF NOT EXISTS idx_graph_edge_ts ON TABLE graph_edge FIELDS ts;

                DEFINE TABLE IF NOT EXISTS community_summary SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_community_ts ON TABLE community_summary FIELDS ts;

                DEFINE TABLE IF NOT EXISTS memory SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_memory_embedding_vector ON TABLE memory
                    FIELDS embedding HNSW DIMENSION 1536;
                DEFINE INDEX IF NOT EXISTS idx_memory_normalized_text ON TABLE memory
                    FIELDS normalized_text UNIQUE;

                DEFINE TABLE IF NOT EXISTS feedback SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_feedback_memory ON TABLE feedback FIELDS memory_id UNIQUE;
                DEFINE INDEX IF NOT EXISTS idx_feedback_favorite ON TABLE feedback FIELDS favorite;

                DEFINE TABLE IF NOT EXISTS thread_message SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_thread_message_feedback ON TABLE thread_message FIELDS feedback_id;
                DEFINE INDEX IF NOT EXISTS idx_thread_message_seq ON TABLE thread_message FIELDS feedback_id, seq;
                DEFINE INDEX IF NOT EXISTS idx_thread_message_created ON TABLE thread_message FIELDS created_at;
                "#,
            )
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Redefines the vector indexes for a different embedding dimension. Used when the
    /// embedding model is changed and existing vectors have to be rebuilt by the ingestion
    /// collaborator.
    pub async fn redefine_vector_indexes(&self, dimensions: usize) -> Result<(), AppError> {
        self.client
            .query(format!(
                "DEFINE INDEX OVERWRITE idx_chunk_embedding_vector ON TABLE chunk_embedding \
                 FIELDS embedding HNSW DIMENSION {dimensions};
                 DEFINE INDEX OVERWRITE idx_memory_embedding_vector ON TABLE memory \
                 FIELDS embedding HNSW DIMENSION {dimensions};"
            ))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn rebuild_indexes(&self) -> Result<(), Error> {
        self.client
            .query("REBUILD INDEX IF EXISTS idx_chunk_embedding_vector ON chunk_embedding")
            .await?;
        self.client
            .query("REBUILD INDEX IF EXISTS idx_memory_embedding_vector ON memory")
            .await?;
        Ok(())
    }

    pub async fn drop_table<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.delete(T::table_name()).await
    }

    /// Runs a raw query against the underlying connection, checking for statement-level errors.
    /// Per-call timeout only; callers still need `.check()` for statement-level errors.
    pub async fn query(&self, sql: impl Into<String>) -> Result<surrealdb::Response, AppError> {
        let sql = sql.into();
        self.with_timeout(async { self.client.query(sql).await }).await
    }

    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, AppError>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.with_timeout(async {
            self.client
                .create((T::table_name(), item.get_id()))
                .content(item)
                .await
        })
        .await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, AppError>
    where
        T: for<'de> StoredObject,
    {
        self.with_timeout(async { self.client.select(T::table_name()).await }).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, AppError>
    where
        T: for<'de> StoredObject,
    {
        self.with_timeout(async { self.client.select((T::table_name(), id)).await }).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, AppError>
    where
        T: for<'de> StoredObject,
    {
        self.with_timeout(async { self.client.delete((T::table_name(), id)).await }).await
    }

    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Creates an in-memory SurrealDB client, one namespace/database pair per test so tests
    /// never share state.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient {
            client: db,
            db_timeout: DEFAULT_DB_TIMEOUT,
        })
    }
}
