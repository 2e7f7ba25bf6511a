//! Thread manager (C12): append-only dialog rooted in a prior memory entry, with optional
//! per-turn retrieval enhancement (§4.12).

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            chunk_embedding::{ChunkEmbedding, ScoredChunk},
            feedback::Feedback,
            memory_entry::MemoryEntry,
            thread_message::ThreadMessage,
        },
    },
    utils::{config::AppConfig, llm::LlmClient},
};
use tracing::instrument;

use crate::synthesize::{extract_references, numbered_context_public as numbered_context};

const DIALOG_SYSTEM_PROMPT: &str = "You are continuing a conversation grounded in previously \
retrieved context. Use the numbered passages (if any) and the prior turns to answer the user's \
latest message. Insert citation markers like [1] when you draw on a numbered passage. If no \
passages are given, answer from the visible conversation alone and do not fabricate citations.";

/// Creates a thread for `memory_id`, seeding it with the bound entry's original question and
/// answer as the first two messages (§3, §4.12 state machine `Empty -> Active`).
#[instrument(skip_all, fields(%memory_id))]
pub async fn create(
    db: &SurrealDbClient,
    memory_id: &str,
    title: String,
) -> Result<Feedback, AppError> {
    let entry = db
        .get_item::<MemoryEntry>(memory_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("memory entry {memory_id} not found")))?;

    let feedback = Feedback::start_thread(db, memory_id, title).await?;

    let seed_user = ThreadMessage::new(feedback.id.clone(), 1, entry.text.clone(), true, None, None);
    db.store_item(seed_user).await?;

    let seed_assistant = ThreadMessage::new(
        feedback.id.clone(),
        2,
        entry.answer.clone(),
        false,
        Some(entry.refs.clone()),
        Some(entry.chunk_ids.clone()),
    );
    db.store_item(seed_assistant).await?;

    Ok(feedback)
}

/// Appends a user turn and its synthesized assistant reply (§4.12 `append`). Ordering is the
/// monotonic `seq` each message is assigned from. Callers MUST hold the per-thread lock (§5)
/// for the duration of this call: `next_seq` is a read-then-write and two concurrent appends on
/// the same thread without that lock can race onto the same seq.
#[instrument(skip_all, fields(%thread_id, enhance_with_retrieval))]
pub async fn append(
    db: &SurrealDbClient,
    llm: &LlmClient,
    config: &AppConfig,
    thread_id: &str,
    user_text: String,
    enhance_with_retrieval: bool,
    k: usize,
) -> Result<ThreadMessage, AppError> {
    let history = ThreadMessage::list(db, thread_id).await?;

    let user_seq = ThreadMessage::next_seq(db, thread_id).await?;
    let user_message =
        ThreadMessage::new(thread_id.to_string(), user_seq, user_text.clone(), true, None, None);
    db.store_item(user_message).await?;

    let last_two: Vec<&ThreadMessage> = history.iter().rev().take(2).collect();
    let recent_history = last_two
        .iter()
        .rev()
        .map(|m| {
            let speaker = if m.is_user { "User" } else { "Assistant" };
            format!("{speaker}: {}", m.text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let (answer, refs, chunk_ids) = if enhance_with_retrieval {
        let query_embedding = llm.embed(config, &user_text).await?;
        let scored = ChunkEmbedding::vector_search(db, &query_embedding, k.clamp(1, 50)).await?;

        let context = numbered_context(&scored);
        let user_prompt = format!(
            "Recent conversation:\n{recent_history}\n\nContext:\n{context}\n\nLatest message: {user_text}"
        );
        let answer = llm
            .complete(
                config,
                &common::utils::llm::CompletionOptions::new(config.generation_model.clone()),
                DIALOG_SYSTEM_PROMPT,
                &user_prompt,
            )
            .await?;
        let refs = extract_references(&answer, &scored);
        let chunk_ids = chunk_id_strings(&scored, &answer);
        (answer, refs, chunk_ids)
    } else {
        let user_prompt = format!("Recent conversation:\n{recent_history}\n\nLatest message: {user_text}");
        let answer = llm
            .complete(
                config,
                &common::utils::llm::CompletionOptions::new(config.generation_model.clone()),
                DIALOG_SYSTEM_PROMPT,
                &user_prompt,
            )
            .await?;
        (answer, Vec::new(), Vec::new())
    };

    let assistant_seq = ThreadMessage::next_seq(db, thread_id).await?;
    let assistant_message = ThreadMessage::new(
        thread_id.to_string(),
        assistant_seq,
        answer,
        false,
        if refs.is_empty() { None } else { Some(refs) },
        if chunk_ids.is_empty() {
            None
        } else {
            Some(chunk_ids)
        },
    );

    let stored = db
        .store_item(assistant_message)
        .await?
        .ok_or_else(|| AppError::Store("thread message insert produced no row".into()))?;

    Ok(stored)
}

fn chunk_id_strings(scored: &[ScoredChunk], answer: &str) -> Vec<String> {
    let cited = crate::synthesize::cited_indices(answer, scored.len());
    cited.into_iter().map(|i| scored[i - 1].chunk.id.clone()).collect()
}

/// Lists a thread's messages in creation order (§4.12 `list`, §8 invariant 6).
pub async fn list(db: &SurrealDbClient, thread_id: &str) -> Result<Vec<ThreadMessage>, AppError> {
    ThreadMessage::list(db, thread_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::memory_entry::MemoryEntry;
    use uuid::Uuid;

    async fn db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn create_seeds_first_two_messages_from_memory_entry() {
        let db = db().await;
        let entry = MemoryEntry::new(
            "what is raft".into(),
            vec![1.0, 0.0],
            "Raft is a consensus algorithm.".into(),
            vec![],
            vec![],
            vec![],
            vec![],
        );
        db.store_item(entry.clone()).await.expect("store entry");

        let feedback = create(&db, &entry.id, "raft-dive".into())
            .await
            .expect("create thread");

        let messages = list(&db, &feedback.id).await.expect("list");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, entry.text);
        assert_eq!(messages[1].text, entry.answer);
        assert!(messages[0].is_user);
        assert!(!messages[1].is_user);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_thread_for_same_memory_entry() {
        let db = db().await;
        let entry = MemoryEntry::new(
            "what is paxos".into(),
            vec![1.0, 0.0],
            "Paxos is a consensus protocol.".into(),
            vec![],
            vec![],
            vec![],
            vec![],
        );
        db.store_item(entry.clone()).await.expect("store entry");

        create(&db, &entry.id, "first".into())
            .await
            .expect("first thread");
        let err = create(&db, &entry.id, "second".into()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_fails_not_found_for_unknown_memory_entry() {
        let db = db().await;
        let err = create(&db, "does-not-exist", "t".into()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
