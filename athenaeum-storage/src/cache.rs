//! Response cache store (§4.1 Query Fingerprint & Cache).
//!
//! Keyed by `query_hash` with upsert semantics: one entry per hash, whose
//! `response` column carries the full [`CachedResponse`] (plan + sources +
//! introduction) as JSON. `normalized_query`/`expires_at`/`hit_count` are
//! denormalized into their own columns so lookups and the background sweep
//! don't have to deserialize JSON just to filter rows.

use async_trait::async_trait;
use athenaeum_core::{AthenaeumError, AthenaeumResult, CacheError, CachedResponse};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

fn backend_err(reason: impl Into<String>) -> AthenaeumError {
    AthenaeumError::Cache(CacheError::Backend {
        reason: reason.into(),
    })
}

/// Pluggable backend for the response cache. Implementations must be
/// thread-safe; the pipeline crate holds one behind an `Arc`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Looks up a cache entry by its fingerprint, regardless of whether it
    /// has expired — callers check [`CachedResponse::is_live`] themselves so
    /// they can distinguish "miss" from "stale hit" for logging.
    async fn lookup(&self, query_hash: &str) -> AthenaeumResult<Option<CachedResponse>>;

    /// Upserts a cache entry, replacing any prior entry for the same hash.
    async fn store(&self, entry: &CachedResponse) -> AthenaeumResult<()>;

    /// Records a cache hit: increments `hit_count` and bumps `last_hit_at`.
    async fn record_hit(&self, query_hash: &str, at: DateTime<Utc>) -> AthenaeumResult<()>;

    /// Drops every cached entry. Used by admin/dev tooling, not the request path.
    async fn invalidate_all(&self) -> AthenaeumResult<u64>;

    /// Deletes entries whose `expires_at` is at or before `now`. Driven by
    /// the background sweep task in `athenaeum-api`.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> AthenaeumResult<u64>;
}

/// In-memory cache store for tests and local/dev runs without Postgres.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, CachedResponse>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn lookup(&self, query_hash: &str) -> AthenaeumResult<Option<CachedResponse>> {
        Ok(self.entries.read().await.get(query_hash).cloned())
    }

    async fn store(&self, entry: &CachedResponse) -> AthenaeumResult<()> {
        self.entries
            .write()
            .await
            .insert(entry.query_hash.clone(), entry.clone());
        Ok(())
    }

    async fn record_hit(&self, query_hash: &str, at: DateTime<Utc>) -> AthenaeumResult<()> {
        if let Some(entry) = self.entries.write().await.get_mut(query_hash) {
            entry.hit_count += 1;
            entry.last_hit_at = Some(at);
        }
        Ok(())
    }

    async fn invalidate_all(&self) -> AthenaeumResult<u64> {
        let mut entries = self.entries.write().await;
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> AthenaeumResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, v| v.is_live(now));
        Ok((before - entries.len()) as u64)
    }
}

/// `deadpool-postgres`-backed cache store.
///
/// Expects a table shaped like:
///
/// ```sql
/// CREATE TABLE cache_entries (
///     query_hash       TEXT PRIMARY KEY,
///     normalized_query TEXT NOT NULL,
///     response         JSONB NOT NULL,
///     created_at       TIMESTAMPTZ NOT NULL,
///     expires_at       TIMESTAMPTZ NOT NULL,
///     hit_count        BIGINT NOT NULL DEFAULT 0,
///     last_hit_at      TIMESTAMPTZ
/// );
/// CREATE INDEX ON cache_entries (expires_at);
/// ```
#[derive(Clone)]
pub struct PgCacheStore {
    pool: Pool,
}

impl PgCacheStore {
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
impl CacheStore for PgCacheStore {
    async fn lookup(&self, query_hash: &str) -> AthenaeumResult<Option<CachedResponse>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT response FROM cache_entries WHERE query_hash = $1",
                &[&query_hash],
            )
            .await
            .map_err(|e| backend_err(format!("lookup failed: {e}")))?;

        row.map(|row| {
            let raw: serde_json::Value = row.get("response");
            serde_json::from_value(raw).map_err(|e| backend_err(format!("corrupt cache row: {e}")))
        })
        .transpose()
    }

    async fn store(&self, entry: &CachedResponse) -> AthenaeumResult<()> {
        let client = self.client().await?;
        let response = serde_json::to_value(entry)
            .map_err(|e| backend_err(format!("failed to serialize entry: {e}")))?;

        client
            .execute(
                "INSERT INTO cache_entries \
                    (query_hash, normalized_query, response, created_at, expires_at, hit_count, last_hit_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (query_hash) DO UPDATE SET \
                    normalized_query = EXCLUDED.normalized_query, \
                    response = EXCLUDED.response, \
                    created_at = EXCLUDED.created_at, \
                    expires_at = EXCLUDED.expires_at, \
                    hit_count = EXCLUDED.hit_count, \
                    last_hit_at = EXCLUDED.last_hit_at",
                &[
                    &entry.query_hash,
                    &entry.normalized_query,
                    &response,
                    &entry.created_at,
                    &entry.expires_at,
                    &entry.hit_count,
                    &entry.last_hit_at,
                ],
            )
            .await
            .map_err(|e| backend_err(format!("store failed: {e}")))?;
        Ok(())
    }

    async fn record_hit(&self, query_hash: &str, at: DateTime<Utc>) -> AthenaeumResult<()> {
        let client = self.client().await?;
        client
            .execute(
                "UPDATE cache_entries SET hit_count = hit_count + 1, last_hit_at = $2 \
                 WHERE query_hash = $1",
                &[&query_hash, &at],
            )
            .await
            .map_err(|e| backend_err(format!("record_hit failed: {e}")))?;
        Ok(())
    }

    async fn invalidate_all(&self) -> AthenaeumResult<u64> {
        let client = self.client().await?;
        let affected = client
            .execute("DELETE FROM cache_entries", &[])
            .await
            .map_err(|e| backend_err(format!("invalidate_all failed: {e}")))?;
        Ok(affected)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> AthenaeumResult<u64> {
        let client = self.client().await?;
        let affected = client
            .execute("DELETE FROM cache_entries WHERE expires_at <= $1", &[&now])
            .await
            .map_err(|e| backend_err(format!("sweep_expired failed: {e}")))?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athenaeum_core::{Plan, SubQuery};
    use chrono::Duration;

    fn sample(hash: &str, created_at: DateTime<Utc>, ttl: Duration) -> CachedResponse {
        CachedResponse {
            query_hash: hash.to_string(),
            normalized_query: "what is justice".to_string(),
            plan: Plan::Simple {
                reasoning: "r".into(),
                queries: vec![SubQuery::fallback("what is justice")],
                semantic_note: None,
            },
            sources: vec![],
            introduction: "Found 1 passage.".to_string(),
            created_at,
            expires_at: created_at + ttl,
            hit_count: 0,
            last_hit_at: None,
        }
    }

    #[tokio::test]
    async fn store_then_lookup_roundtrips() {
        let store = InMemoryCacheStore::new();
        let entry = sample("abc", Utc::now(), Duration::hours(1));
        store.store(&entry).await.unwrap();

        let found = store.lookup("abc").await.unwrap().unwrap();
        assert_eq!(found.query_hash, "abc");
        assert_eq!(found.hit_count, 0);
    }

    #[tokio::test]
    async fn lookup_miss_returns_none() {
        let store = InMemoryCacheStore::new();
        assert!(store.lookup("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_hit_increments_count_and_sets_timestamp() {
        let store = InMemoryCacheStore::new();
        store
            .store(&sample("abc", Utc::now(), Duration::hours(1)))
            .await
            .unwrap();

        let at = Utc::now();
        store.record_hit("abc", at).await.unwrap();
        let found = store.lookup("abc").await.unwrap().unwrap();
        assert_eq!(found.hit_count, 1);
        assert_eq!(found.last_hit_at, Some(at));
    }

    #[tokio::test]
    async fn sweep_expired_drops_only_stale_entries() {
        let store = InMemoryCacheStore::new();
        let now = Utc::now();
        store
            .store(&sample("fresh", now, Duration::hours(1)))
            .await
            .unwrap();
        store
            .store(&sample("stale", now - Duration::hours(2), Duration::hours(1)))
            .await
            .unwrap();

        let swept = store.sweep_expired(now).await.unwrap();
        assert_eq!(swept, 1);
        assert!(store.lookup("fresh").await.unwrap().is_some());
        assert!(store.lookup("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears_everything() {
        let store = InMemoryCacheStore::new();
        store
            .store(&sample("a", Utc::now(), Duration::hours(1)))
            .await
            .unwrap();
        store
            .store(&sample("b", Utc::now(), Duration::hours(1)))
            .await
            .unwrap();

        let cleared = store.invalidate_all().await.unwrap();
        assert_eq!(cleared, 2);
        assert!(store.lookup("a").await.unwrap().is_none());
    }
}
