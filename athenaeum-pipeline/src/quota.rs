//! Quota Gate (§4.2): resolves an [`Identity`] to an admission decision
//! and, on successful completion, increments its daily counter.
//!
//! Check and increment are deliberately separate calls against
//! [`QuotaStore`] — the at-most-once guarantee is per-completion, not a
//! single atomic check-and-increment (§4.2, §9 Open Questions).

use athenaeum_core::{AthenaeumResult, Identity, QuotaDecision};
use athenaeum_storage::QuotaStore;
use chrono::Utc;
use std::sync::Arc;

pub struct QuotaGate {
    store: Arc<dyn QuotaStore>,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self { store }
    }

    /// Rules, in order (§4.2):
    /// 1. banned → denied.
    /// 2. unbounded tiers → allowed, remaining = None.
    /// 3. bounded authenticated tiers → allowed iff `search_count < limit`.
    /// 4. anonymous with a recognized id → allowed iff `search_count < 10`.
    /// 5. anonymous without an id header → allowed, unmetered.
    pub async fn check(&self, identity: &Identity) -> AthenaeumResult<QuotaDecision> {
        if let Identity::Authenticated { tier, .. } = identity {
            if tier.daily_limit() == Some(0) {
                return Ok(QuotaDecision::deny("suspended"));
            }
        }

        if let Identity::Anonymous { opaque_id, .. } = identity {
            if opaque_id.is_none() {
                return Ok(QuotaDecision::unbounded());
            }
        }

        let limit = match identity {
            Identity::Authenticated { tier, .. } => tier.daily_limit(),
            Identity::Anonymous { .. } => Some(10),
        };

        let Some(limit) = limit else {
            return Ok(QuotaDecision::unbounded());
        };

        let today = Utc::now().date_naive();
        let count = self.store.current_count(&identity.counter_key(), today).await?;
        let remaining = limit - count;

        if remaining > 0 {
            Ok(QuotaDecision::allow(Some(remaining), Some(limit)))
        } else {
            Ok(QuotaDecision::deny("query_limit_exceeded"))
        }
    }

    /// Increments the identity's counter by exactly one. Called once per
    /// successful completion, cache hits included (§4.2).
    pub async fn record_completion(&self, identity: &Identity) -> AthenaeumResult<i64> {
        let today = Utc::now().date_naive();
        self.store.increment(&identity.counter_key(), today).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athenaeum_core::Tier;
    use athenaeum_storage::InMemoryQuotaStore;

    fn gate() -> QuotaGate {
        QuotaGate::new(Arc::new(InMemoryQuotaStore::new()))
    }

    #[tokio::test]
    async fn banned_is_always_denied() {
        let gate = gate();
        let identity = Identity::Authenticated {
            subject_id: "u1".into(),
            tier: Tier::Banned,
            search_count: 0,
        };
        let decision = gate.check(&identity).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("suspended"));
    }

    #[tokio::test]
    async fn unbounded_tier_is_never_denied() {
        let gate = gate();
        let identity = Identity::Authenticated {
            subject_id: "u1".into(),
            tier: Tier::Patron,
            search_count: 10_000,
        };
        let decision = gate.check(&identity).await.unwrap();
        assert!(decision.allowed);
        assert!(decision.remaining.is_none());
    }

    #[tokio::test]
    async fn anonymous_without_id_is_unmetered() {
        let gate = gate();
        let identity = Identity::Anonymous {
            opaque_id: None,
            user_agent: None,
            search_count: 0,
        };
        let decision = gate.check(&identity).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn anonymous_denied_once_count_reaches_limit() {
        let gate = gate();
        let identity = Identity::Anonymous {
            opaque_id: Some("user_abc".into()),
            user_agent: None,
            search_count: 0,
        };
        for _ in 0..10 {
            gate.record_completion(&identity).await.unwrap();
        }
        let decision = gate.check(&identity).await.unwrap();
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn completion_increments_by_exactly_one() {
        let gate = gate();
        let identity = Identity::Authenticated {
            subject_id: "u1".into(),
            tier: Tier::Verified,
            search_count: 0,
        };
        let before = gate.check(&identity).await.unwrap();
        gate.record_completion(&identity).await.unwrap();
        let after = gate.check(&identity).await.unwrap();
        assert_eq!(before.remaining.unwrap() - after.remaining.unwrap(), 1);
    }
}
