//! Conversational memory store (§4.9 Memory Adapter).
//!
//! Append-only: one row per turn, retrieved by `identity_id` for the
//! planner's context. Reading memory is explicitly optional to the rest of
//! the pipeline (§9 Design Notes) — a `MemoryStore` failure is always a
//! [`athenaeum_core::MemoryError`], which [`AthenaeumError::is_soft`] marks
//! non-fatal.

use async_trait::async_trait;
use athenaeum_core::{AthenaeumError, AthenaeumResult, MemoryEntry, MemoryError};
use deadpool_postgres::Pool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

fn backend_err(reason: impl Into<String>) -> AthenaeumError {
    AthenaeumError::Memory(MemoryError::Backend {
        reason: reason.into(),
    })
}

/// Pluggable backend for conversational memory.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Appends a turn to the log.
    async fn append(&self, entry: &MemoryEntry) -> AthenaeumResult<()>;

    /// Returns the most recent `limit` turns for an identity, oldest first.
    async fn recent_for_identity(
        &self,
        identity_id: &str,
        limit: i64,
    ) -> AthenaeumResult<Vec<MemoryEntry>>;
}

/// In-memory memory store for tests and local/dev runs without Postgres.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<MemoryEntry>>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn append(&self, entry: &MemoryEntry) -> AthenaeumResult<()> {
        self.entries
            .write()
            .await
            .entry(entry.identity_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn recent_for_identity(
        &self,
        identity_id: &str,
        limit: i64,
    ) -> AthenaeumResult<Vec<MemoryEntry>> {
        let entries = self.entries.read().await;
        let Some(turns) = entries.get(identity_id) else {
            return Ok(Vec::new());
        };
        let limit = limit.max(0) as usize;
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }
}

/// `deadpool-postgres`-backed memory store.
///
/// Expects a table shaped like:
///
/// ```sql
/// CREATE TABLE memory_entries (
///     id          UUID PRIMARY KEY,
///     identity_id TEXT NOT NULL,
///     role        TEXT NOT NULL,
///     text        TEXT NOT NULL,
///     metadata    JSONB NOT NULL DEFAULT '{}',
///     created_at  TIMESTAMPTZ NOT NULL
/// );
/// CREATE INDEX ON memory_entries (identity_id, created_at);
/// ```
#[derive(Clone)]
pub struct PgMemoryStore {
    pool: Pool,
}

impl PgMemoryStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> AthenaeumResult<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| backend_err(format!("checkout failed: {e}")))
    }
}

#[async_trait]
impl MemoryStore for PgMemoryStore {
    async fn append(&self, entry: &MemoryEntry) -> AthenaeumResult<()> {
        let client = self.client().await?;
        let role = match entry.role {
            athenaeum_core::MemoryRole::User => "user",
            athenaeum_core::MemoryRole::Assistant => "assistant",
        };
        client
            .execute(
                "INSERT INTO memory_entries (id, identity_id, role, text, metadata, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &entry.id,
                    &entry.identity_id,
                    &role,
                    &entry.text,
                    &entry.metadata,
                    &entry.created_at,
                ],
            )
            .await
            .map_err(|e| backend_err(format!("append failed: {e}")))?;
        Ok(())
    }

    async fn recent_for_identity(
        &self,
        identity_id: &str,
        limit: i64,
    ) -> AthenaeumResult<Vec<MemoryEntry>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, identity_id, role, text, metadata, created_at FROM ( \
                    SELECT * FROM memory_entries WHERE identity_id = $1 \
                    ORDER BY created_at DESC LIMIT $2 \
                 ) recent ORDER BY created_at ASC",
                &[&identity_id, &limit],
            )
            .await
            .map_err(|e| backend_err(format!("recent_for_identity failed: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let role_str: String = row.get("role");
                let role = match role_str.as_str() {
                    "user" => athenaeum_core::MemoryRole::User,
                    "assistant" => athenaeum_core::MemoryRole::Assistant,
                    other => {
                        return Err(backend_err(format!("unknown memory role: {other}")));
                    }
                };
                Ok(MemoryEntry {
                    id: row.get("id"),
                    identity_id: row.get("identity_id"),
                    role,
                    text: row.get("text"),
                    metadata: row.get("metadata"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_fetch_returns_in_chronological_order() {
        let store = InMemoryMemoryStore::new();
        store
            .append(&MemoryEntry::user_turn("user_abc", "first"))
            .await
            .unwrap();
        store
            .append(&MemoryEntry::assistant_turn("user_abc", "second"))
            .await
            .unwrap();

        let turns = store.recent_for_identity("user_abc", 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "first");
        assert_eq!(turns[1].text, "second");
    }

    #[tokio::test]
    async fn recent_for_identity_respects_limit() {
        let store = InMemoryMemoryStore::new();
        for i in 0..5 {
            store
                .append(&MemoryEntry::user_turn("user_abc", format!("turn {i}")))
                .await
                .unwrap();
        }

        let turns = store.recent_for_identity("user_abc", 2).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "turn 3");
        assert_eq!(turns[1].text, "turn 4");
    }

    #[tokio::test]
    async fn unknown_identity_returns_empty() {
        let store = InMemoryMemoryStore::new();
        let turns = store.recent_for_identity("nobody", 10).await.unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let store = InMemoryMemoryStore::new();
        store
            .append(&MemoryEntry::user_turn("a", "a's turn"))
            .await
            .unwrap();
        store
            .append(&MemoryEntry::user_turn("b", "b's turn"))
            .await
            .unwrap();

        let a_turns = store.recent_for_identity("a", 10).await.unwrap();
        assert_eq!(a_turns.len(), 1);
        assert_eq!(a_turns[0].text, "a's turn");
    }
}
