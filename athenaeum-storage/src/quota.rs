//! Quota counter store (§4.2 Quota Gate).
//!
//! Tracks a per-identity, per-day search count. The gate's tier→limit
//! mapping lives on [`athenaeum_core::Tier`]; this store only owns the
//! counter itself, keyed by [`athenaeum_core::Identity::counter_key`] and
//! bucketed by UTC calendar day so counts reset at midnight without a
//! separate cleanup job.

use async_trait::async_trait;
use athenaeum_core::{AthenaeumError, AthenaeumResult, QuotaError};
use chrono::NaiveDate;
use deadpool_postgres::Pool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

fn store_err(reason: impl Into<String>) -> AthenaeumError {
    AthenaeumError::Quota(QuotaError::Store {
        reason: reason.into(),
    })
}

/// Pluggable backend for quota counters.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Returns the current count for `key` on `day`, or 0 if no row exists.
    async fn current_count(&self, key: &str, day: NaiveDate) -> AthenaeumResult<i64>;

    /// Atomically increments the counter for `key` on `day` and returns the
    /// new count.
    async fn increment(&self, key: &str, day: NaiveDate) -> AthenaeumResult<i64>;
}

/// In-memory quota store for tests and local/dev runs without Postgres.
#[derive(Debug, Default, Clone)]
pub struct InMemoryQuotaStore {
    counters: Arc<RwLock<HashMap<(String, NaiveDate), i64>>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn current_count(&self, key: &str, day: NaiveDate) -> AthenaeumResult<i64> {
        Ok(*self
            .counters
            .read()
            .await
            .get(&(key.to_string(), day))
            .unwrap_or(&0))
    }

    async fn increment(&self, key: &str, day: NaiveDate) -> AthenaeumResult<i64> {
        let mut counters = self.counters.write().await;
        let count = counters.entry((key.to_string(), day)).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

/// `deadpool-postgres`-backed quota counter store.
///
/// Expects a table shaped like:
///
/// ```sql
/// CREATE TABLE quota_counters (
///     key   TEXT NOT NULL,
///     day   DATE NOT NULL,
///     count BIGINT NOT NULL DEFAULT 0,
///     PRIMARY KEY (key, day)
/// );
/// ```
#[derive(Clone)]
pub struct PgQuotaStore {
    pool: Pool,
}

impl PgQuotaStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> AthenaeumResult<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| store_err(format!("checkout failed: {e}")))
    }
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn current_count(&self, key: &str, day: NaiveDate) -> AthenaeumResult<i64> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT count FROM quota_counters WHERE key = $1 AND day = $2",
                &[&key, &day],
            )
            .await
            .map_err(|e| store_err(format!("current_count failed: {e}")))?;
        Ok(row.map(|r| r.get("count")).unwrap_or(0))
    }

    async fn increment(&self, key: &str, day: NaiveDate) -> AthenaeumResult<i64> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO quota_counters (key, day, count) VALUES ($1, $2, 1) \
                 ON CONFLICT (key, day) DO UPDATE SET count = quota_counters.count + 1 \
                 RETURNING count",
                &[&key, &day],
            )
            .await
            .map_err(|e| store_err(format!("increment failed: {e}")))?;
        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 27).unwrap()
    }

    #[tokio::test]
    async fn fresh_key_starts_at_zero() {
        let store = InMemoryQuotaStore::new();
        assert_eq!(store.current_count("auth:abc", today()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increment_returns_running_total() {
        let store = InMemoryQuotaStore::new();
        assert_eq!(store.increment("auth:abc", today()).await.unwrap(), 1);
        assert_eq!(store.increment("auth:abc", today()).await.unwrap(), 2);
        assert_eq!(store.current_count("auth:abc", today()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn different_days_are_independent_buckets() {
        let store = InMemoryQuotaStore::new();
        let day1 = today();
        let day2 = day1.succ_opt().unwrap();

        store.increment("auth:abc", day1).await.unwrap();
        store.increment("auth:abc", day1).await.unwrap();

        assert_eq!(store.current_count("auth:abc", day1).await.unwrap(), 2);
        assert_eq!(store.current_count("auth:abc", day2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let store = InMemoryQuotaStore::new();
        store.increment("auth:a", today()).await.unwrap();
        store.increment("anon:b", today()).await.unwrap();
        store.increment("anon:b", today()).await.unwrap();

        assert_eq!(store.current_count("auth:a", today()).await.unwrap(), 1);
        assert_eq!(store.current_count("anon:b", today()).await.unwrap(), 2);
    }
}
