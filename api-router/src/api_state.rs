use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use common::{storage::db::SurrealDbClient, utils::config::AppConfig, utils::llm::LlmClient};
use tokio::sync::Mutex;

/// Per-thread-id locks guarding `qa_pipeline::thread::append` (§5: "Thread appends are
/// serialized per thread id"). Keyed by `feedback_id`; grows with the number of distinct
/// threads ever appended to, entries are never removed since threads are long-lived.
#[derive(Clone, Default)]
pub struct ThreadLocks {
    locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ThreadLocks {
    /// Returns the lock for `thread_id`, creating it if this is the first append seen for it.
    pub fn get(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub llm: Arc<LlmClient>,
    pub config: Arc<AppConfig>,
    pub thread_locks: ThreadLocks,
}

impl ApiState {
    pub async fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db = SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
            config.db_timeout_secs,
        )
        .await?;
        db.apply_migrations().await?;

        let llm = LlmClient::new(&config);

        Ok(Self {
            db: Arc::new(db),
            llm: Arc::new(llm),
            config: Arc::new(config),
            thread_locks: ThreadLocks::default(),
        })
    }
}
