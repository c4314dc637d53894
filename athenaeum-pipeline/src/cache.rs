//! Query Fingerprint & Cache orchestration (§4.1).
//!
//! Wraps [`CacheStore`] with the normalization/fingerprint step and the
//! cache-exclusivity rule for queries carrying extracted text-contains
//! filter terms. Cache failures are non-fatal throughout: every error
//! from the store is logged and treated as a miss (lookup) or a no-op
//! (store), per [`athenaeum_core::AthenaeumError::is_soft`].

use athenaeum_core::{fingerprint, normalize, CachedResponse};
use athenaeum_storage::CacheStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::warn;

pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    /// Dev/debug flag: disables lookup globally (§4.1). Writes still
    /// happen so the cache is warm if the flag is later cleared.
    dev_mode: bool,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, dev_mode: bool) -> Self {
        Self {
            store,
            ttl,
            dev_mode,
        }
    }

    /// Whether `raw_text_has_filters` makes this query cache-eligible at
    /// all (§4.1, §8 Cache exclusivity).
    pub fn eligible(has_text_contains_filters: bool) -> bool {
        !has_text_contains_filters
    }

    /// Looks up a live (non-expired) entry by fingerprint of the
    /// normalized query, recording a hit on success. Returns `None` on
    /// miss, expiry, dev-mode, or any backend failure.
    pub async fn lookup(&self, clean_query: &str) -> Option<CachedResponse> {
        if self.dev_mode {
            return None;
        }

        let hash = fingerprint(clean_query);
        let entry = match self.store.lookup(&hash).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(error = %e, "cache lookup failed, treating as miss");
                return None;
            }
        };

        let now = Utc::now();
        if !entry.is_live(now) {
            return None;
        }

        if let Err(e) = self.store.record_hit(&hash, now).await {
            warn!(error = %e, "cache record_hit failed");
        }

        Some(entry)
    }

    /// Upserts the response under the fingerprint of `clean_query`,
    /// resetting `created_at`/`hit_count` (§4.1). Failures are logged and
    /// swallowed — a cache miss on the next identical query is an
    /// acceptable outcome of a cache write failing.
    pub async fn store(
        &self,
        clean_query: &str,
        plan: athenaeum_core::Plan,
        sources: Vec<athenaeum_core::AnnotatedPassage>,
        introduction: String,
    ) {
        let now = Utc::now();
        let entry = CachedResponse {
            query_hash: fingerprint(clean_query),
            normalized_query: normalize(clean_query),
            plan,
            sources,
            introduction,
            created_at: now,
            expires_at: now + self.ttl,
            hit_count: 0,
            last_hit_at: None,
        };

        if let Err(e) = self.store.store(&entry).await {
            warn!(error = %e, "cache store failed");
        }
    }

    pub async fn invalidate_all(&self) -> u64 {
        match self.store.invalidate_all().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "cache invalidate_all failed");
                0
            }
        }
    }

    pub async fn sweep_expired(&self) -> u64 {
        match self.store.sweep_expired(Utc::now()).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "cache sweep_expired failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athenaeum_core::{Plan, SubQuery};
    use athenaeum_storage::InMemoryCacheStore;

    fn cache() -> ResponseCache {
        ResponseCache::new(Arc::new(InMemoryCacheStore::new()), Duration::hours(6), false)
    }

    #[tokio::test]
    async fn miss_then_store_then_hit() {
        let cache = cache();
        assert!(cache.lookup("What is Justice").await.is_none());

        let plan = Plan::Simple {
            reasoning: "r".into(),
            queries: vec![SubQuery::fallback("what is justice")],
            semantic_note: None,
        };
        cache
            .store("What is Justice", plan, vec![], "Found 1 passage.".into())
            .await;

        let hit = cache.lookup("what   is    justice").await;
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().introduction, "Found 1 passage.");
    }

    #[tokio::test]
    async fn dev_mode_disables_lookup() {
        let cache = ResponseCache::new(Arc::new(InMemoryCacheStore::new()), Duration::hours(6), true);
        let plan = Plan::Simple {
            reasoning: "r".into(),
            queries: vec![SubQuery::fallback("q")],
            semantic_note: None,
        };
        cache.store("q", plan, vec![], "intro".into()).await;
        assert!(cache.lookup("q").await.is_none());
    }

    #[test]
    fn eligibility_excludes_text_contains_queries() {
        assert!(ResponseCache::eligible(false));
        assert!(!ResponseCache::eligible(true));
    }
}
