//! Caller identity and quota tier (§3 Identity, §4.2 Quota Gate).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quota tier assigned to an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Banned,
    Verified,
    Approved,
    Patron,
    Institutional,
    Admin,
}

impl Tier {
    /// Tiers exempt from the daily query limit (§4.2).
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Tier::Patron | Tier::Institutional | Tier::Admin)
    }

    /// Per-day query limit for this tier, or `None` if unbounded.
    pub fn daily_limit(&self) -> Option<i64> {
        match self {
            Tier::Banned => Some(0),
            Tier::Verified => Some(20),
            Tier::Approved => Some(100),
            Tier::Patron | Tier::Institutional | Tier::Admin => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Banned => "banned",
            Tier::Verified => "verified",
            Tier::Approved => "approved",
            Tier::Patron => "patron",
            Tier::Institutional => "institutional",
            Tier::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

/// The caller behind a query, as resolved from request headers (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Authenticated {
        subject_id: String,
        tier: Tier,
        search_count: i64,
    },
    Anonymous {
        opaque_id: Option<String>,
        user_agent: Option<String>,
        search_count: i64,
    },
}

impl Identity {
    /// Key used to look up/increment this identity's quota counter.
    /// Anonymous callers with no usable id are keyed by a fixed sentinel,
    /// so they share the tightest possible bucket rather than bypassing
    /// the gate entirely.
    pub fn counter_key(&self) -> String {
        match self {
            Identity::Authenticated { subject_id, .. } => format!("auth:{subject_id}"),
            Identity::Anonymous {
                opaque_id: Some(id),
                ..
            } => format!("anon:{id}"),
            Identity::Anonymous {
                opaque_id: None, ..
            } => "anon:unidentified".to_string(),
        }
    }

    pub fn search_count(&self) -> i64 {
        match self {
            Identity::Authenticated { search_count, .. } => *search_count,
            Identity::Anonymous { search_count, .. } => *search_count,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated { .. })
    }

    /// Whether this identity carries an id the quota gate can key a
    /// counter on (§4.2 rule 5: unrecognized anonymous callers are
    /// unmetered).
    pub fn has_recognized_id(&self) -> bool {
        match self {
            Identity::Authenticated { .. } => true,
            Identity::Anonymous { opaque_id, .. } => opaque_id.is_some(),
        }
    }
}

/// Validates the `X-User-ID` header format for anonymous callers:
/// `user_` or `sess_` prefix followed by one or more hex/dash characters.
pub fn is_valid_anonymous_id(raw: &str) -> bool {
    let rest = raw
        .strip_prefix("user_")
        .or_else(|| raw.strip_prefix("sess_"));
    match rest {
        Some(r) if !r.is_empty() => r
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_tiers() {
        assert!(Tier::Patron.is_unbounded());
        assert!(Tier::Institutional.is_unbounded());
        assert!(Tier::Admin.is_unbounded());
        assert!(!Tier::Verified.is_unbounded());
        assert!(!Tier::Approved.is_unbounded());
        assert!(!Tier::Banned.is_unbounded());
    }

    #[test]
    fn anonymous_id_pattern() {
        assert!(is_valid_anonymous_id("user_abc123-def"));
        assert!(is_valid_anonymous_id("sess_0123456789abcdef"));
        assert!(!is_valid_anonymous_id("user_"));
        assert!(!is_valid_anonymous_id("token_abc123"));
        assert!(!is_valid_anonymous_id("user_ABCXYZ"));
    }

    #[test]
    fn counter_key_for_unidentified_anonymous() {
        let id = Identity::Anonymous {
            opaque_id: None,
            user_agent: None,
            search_count: 0,
        };
        assert_eq!(id.counter_key(), "anon:unidentified");
        assert!(!id.is_authenticated());
    }

    #[test]
    fn counter_key_distinguishes_auth_and_anon() {
        let auth = Identity::Authenticated {
            subject_id: "abc".into(),
            tier: Tier::Approved,
            search_count: 3,
        };
        let anon = Identity::Anonymous {
            opaque_id: Some("abc".into()),
            user_agent: None,
            search_count: 3,
        };
        assert_ne!(auth.counter_key(), anon.counter_key());
    }
}
