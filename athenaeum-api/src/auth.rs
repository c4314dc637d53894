//! Identity resolution from request headers (§3 Identity, §6).
//!
//! Authentication itself is an explicit Non-goal (§1): the core never
//! validates credentials. What it does own is turning whatever an upstream
//! authenticator has already decided into an [`Identity`] the quota gate
//! can act on — `X-Subject-Id`/`X-Tier` for an already-authenticated
//! caller, `X-User-ID` for an anonymous one (§6's
//! `^(user_|sess_)[a-f0-9-]+$` pattern, validated by
//! `athenaeum_core::is_valid_anonymous_id`).

use athenaeum_core::{is_valid_anonymous_id, Identity, Tier};
use axum::http::HeaderMap;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_tier(raw: &str) -> Option<Tier> {
    match raw.to_lowercase().as_str() {
        "banned" => Some(Tier::Banned),
        "verified" => Some(Tier::Verified),
        "approved" => Some(Tier::Approved),
        "patron" => Some(Tier::Patron),
        "institutional" => Some(Tier::Institutional),
        "admin" => Some(Tier::Admin),
        _ => None,
    }
}

/// Resolves the caller's [`Identity`] from request headers.
///
/// Unrecognized or malformed tier/anonymous-id headers degrade to the
/// least-privileged shape rather than erroring — a query-time endpoint
/// should never 401 on an identity header it can't parse; it should just
/// treat the caller as an unmetered anonymous visitor.
pub fn resolve_identity(headers: &HeaderMap) -> Identity {
    if let (Some(subject_id), Some(tier_raw)) =
        (header_str(headers, "x-subject-id"), header_str(headers, "x-tier"))
    {
        if let Some(tier) = parse_tier(tier_raw) {
            return Identity::Authenticated {
                subject_id: subject_id.to_string(),
                tier,
                search_count: 0,
            };
        }
    }

    let user_agent = header_str(headers, "user-agent").map(|s| s.to_string());
    let opaque_id = header_str(headers, "x-user-id")
        .filter(|id| is_valid_anonymous_id(id))
        .map(|id| id.to_string());

    Identity::Anonymous {
        opaque_id,
        user_agent,
        search_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn authenticated_via_trusted_headers() {
        let h = headers(&[("x-subject-id", "user-42"), ("x-tier", "patron")]);
        let identity = resolve_identity(&h);
        assert!(identity.is_authenticated());
        match identity {
            Identity::Authenticated { subject_id, tier, .. } => {
                assert_eq!(subject_id, "user-42");
                assert_eq!(tier, Tier::Patron);
            }
            _ => panic!("expected authenticated identity"),
        }
    }

    #[test]
    fn anonymous_with_valid_user_id() {
        let h = headers(&[("x-user-id", "user_abc-123")]);
        let identity = resolve_identity(&h);
        assert!(!identity.is_authenticated());
        assert!(identity.has_recognized_id());
    }

    #[test]
    fn anonymous_with_invalid_user_id_is_unidentified() {
        let h = headers(&[("x-user-id", "not-a-valid-id")]);
        let identity = resolve_identity(&h);
        assert!(!identity.has_recognized_id());
    }

    #[test]
    fn no_headers_is_unidentified_anonymous() {
        let identity = resolve_identity(&HeaderMap::new());
        assert!(!identity.is_authenticated());
        assert!(!identity.has_recognized_id());
    }

    #[test]
    fn unparsable_tier_degrades_to_anonymous() {
        let h = headers(&[("x-subject-id", "user-1"), ("x-tier", "not-a-tier")]);
        let identity = resolve_identity(&h);
        assert!(!identity.is_authenticated());
    }
}
