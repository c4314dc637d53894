//! Cached response shape (§3 Cached Response, §4.1).

use crate::candidate::AnnotatedPassage;
use crate::plan::Plan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A complete prior response, keyed by `query_hash` (upsert semantics:
/// one entry per hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CachedResponse {
    pub query_hash: String,
    pub normalized_query: String,
    pub plan: Plan,
    pub sources: Vec<AnnotatedPassage>,
    pub introduction: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: i64,
    pub last_hit_at: Option<DateTime<Utc>>,
}

impl CachedResponse {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SubQuery;
    use chrono::Duration;

    fn sample(created_at: DateTime<Utc>, ttl: Duration) -> CachedResponse {
        CachedResponse {
            query_hash: "abc".into(),
            normalized_query: "what is justice".into(),
            plan: Plan::Simple {
                reasoning: "r".into(),
                queries: vec![SubQuery::fallback("what is justice")],
                semantic_note: None,
            },
            sources: vec![],
            introduction: "Found 1 passage.".into(),
            created_at,
            expires_at: created_at + ttl,
            hit_count: 0,
            last_hit_at: None,
        }
    }

    #[test]
    fn expired_entries_are_not_live() {
        let now = Utc::now();
        let entry = sample(now - Duration::hours(2), Duration::hours(1));
        assert!(!entry.is_live(now));
    }

    #[test]
    fn fresh_entries_are_live() {
        let now = Utc::now();
        let entry = sample(now, Duration::hours(1));
        assert!(entry.is_live(now));
    }
}
