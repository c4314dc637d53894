//! HTTP-layer rate limiting, keyed by caller identity rather than tenant.
//!
//! Distinct from the query quota (§7's daily search-count ceiling, enforced
//! by `QuotaGate` deep in the pipeline): this is a per-minute request-rate
//! ceiling against abusive traffic, checked before a request even reaches a
//! handler. An authenticated caller is keyed by `subject_id`; everyone else
//! by IP, same as the teacher's tenant-vs-IP split.

use crate::auth::resolve_identity;
use crate::config::ApiConfig;
use crate::error::ApiError;
use athenaeum_core::Identity;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    Ip(IpAddr),
    Subject(String),
}

#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<ApiConfig>,
    limiters: Arc<DashMap<RateLimitKey, Arc<DirectRateLimiter>>>,
}

impl RateLimitState {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config: Arc::new(config),
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn get_or_create_limiter(&self, key: &RateLimitKey) -> Arc<DirectRateLimiter> {
        self.limiters
            .entry(key.clone())
            .or_insert_with(|| {
                let requests_per_minute = match key {
                    RateLimitKey::Ip(_) => self.config.rate_limit_unauthenticated,
                    RateLimitKey::Subject(_) => self.config.rate_limit_authenticated,
                };
                let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN))
                    .allow_burst(NonZeroU32::new(self.config.rate_limit_burst).unwrap_or(NonZeroU32::MIN));
                Arc::new(RateLimiter::direct(quota))
            })
            .clone()
    }
}

fn extract_client_ip(request: &Request, fallback: SocketAddr) -> IpAddr {
    if let Some(forwarded_for) = request.headers().get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first_ip) = forwarded_for.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse() {
                return ip;
            }
        }
    }
    if let Some(real_ip) = request.headers().get("x-real-ip").and_then(|h| h.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse() {
            return ip;
        }
    }
    fallback.ip()
}

/// Runs before every route. Skips entirely when `config.rate_limit_enabled`
/// is false (dev mode).
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let key = match resolve_identity(request.headers()) {
        Identity::Authenticated { subject_id, .. } => RateLimitKey::Subject(subject_id),
        Identity::Anonymous { .. } => RateLimitKey::Ip(extract_client_ip(&request, addr)),
    };

    let limiter = state.get_or_create_limiter(&key);
    match limiter.check() {
        Ok(_) => {
            let limit = match &key {
                RateLimitKey::Ip(_) => state.config.rate_limit_unauthenticated,
                RateLimitKey::Subject(_) => state.config.rate_limit_authenticated,
            };
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from_str(&limit.to_string()).unwrap_or_else(|_| HeaderValue::from_static("100")),
            );
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            Err(ApiError::too_many_requests(Some(retry_after)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_keys_get_distinct_limiters() {
        let state = RateLimitState::new(ApiConfig::default());
        let ip_key = RateLimitKey::Ip("127.0.0.1".parse().unwrap());
        let subject_key = RateLimitKey::Subject("user-1".to_string());
        let a = state.get_or_create_limiter(&ip_key);
        let b = state.get_or_create_limiter(&subject_key);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn same_key_reuses_limiter() {
        let state = RateLimitState::new(ApiConfig::default());
        let key = RateLimitKey::Ip("127.0.0.1".parse().unwrap());
        let a = state.get_or_create_limiter(&key);
        let b = state.get_or_create_limiter(&key);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
