//! Quota gate decision shape (§4.2).

use serde::{Deserialize, Serialize};

/// Outcome of a quota check. `remaining`/`limit` of `None` denotes
/// unbounded (§4.2 rules 2 and 5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: Option<i64>,
    pub limit: Option<i64>,
    pub reason: Option<String>,
}

impl QuotaDecision {
    pub fn allow(remaining: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            remaining: Some(0),
            limit: Some(0),
            reason: Some(reason.into()),
        }
    }

    pub fn unbounded() -> Self {
        Self::allow(None, None)
    }
}
