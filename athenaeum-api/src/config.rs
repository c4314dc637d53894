//! API Configuration
//!
//! CORS and rate-limit settings in the teacher's `ApiConfig` shape, plus the
//! query-time pipeline knobs §6 lists as config surface (index endpoint,
//! cache TTL, dev-mode, fan-out/analyzer concurrency, LLM/request
//! deadlines) — those live on `athenaeum_core::PipelineConfig` and are
//! composed in here rather than duplicated.

use athenaeum_core::PipelineConfig;
use athenaeum_storage::PoolConfig;
use std::time::Duration;

/// API-layer configuration: HTTP hardening plus the pipeline config it wraps.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_host: String,
    pub bind_port: u16,

    /// Allowed CORS origins (empty = allow all, dev mode).
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,
    pub cors_max_age_secs: u64,

    pub rate_limit_enabled: bool,
    pub rate_limit_unauthenticated: u32,
    pub rate_limit_authenticated: u32,
    pub rate_limit_burst: u32,

    /// Interval between background cache-sweep passes (§C).
    pub cache_sweep_interval: Duration,

    /// Query-time pipeline tuning (fan-out concurrency, analyzer batch
    /// size, cache TTL, dev-mode cache bypass, deadlines — §6).
    pub pipeline: PipelineConfig,

    /// Postgres connection settings for the cache/memory/quota stores.
    pub db: PoolConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 3000,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86_400,
            rate_limit_enabled: true,
            rate_limit_unauthenticated: 100,
            rate_limit_authenticated: 1000,
            rate_limit_burst: 10,
            cache_sweep_interval: Duration::from_secs(600),
            pipeline: PipelineConfig::default(),
            db: PoolConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Builds from environment variables, falling back to defaults for
    /// anything unset or unparsable.
    ///
    /// - `ATHENAEUM_API_BIND` / `PORT` / `ATHENAEUM_API_PORT`
    /// - `ATHENAEUM_CORS_ORIGINS` (comma-separated, empty = allow all)
    /// - `ATHENAEUM_CORS_ALLOW_CREDENTIALS`
    /// - `ATHENAEUM_CORS_MAX_AGE_SECS`
    /// - `ATHENAEUM_RATE_LIMIT_ENABLED` / `_UNAUTHENTICATED` / `_AUTHENTICATED` / `_BURST`
    /// - `ATHENAEUM_CACHE_SWEEP_INTERVAL_SECS`
    /// - the `ATHENAEUM_*` pipeline variables read by `PipelineConfig::from_env`
    /// - the `ATHENAEUM_DB_*` variables read by `PoolConfig::from_env`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_host = std::env::var("ATHENAEUM_API_BIND").unwrap_or(defaults.bind_host);
        let bind_port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("ATHENAEUM_API_PORT").ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.bind_port);

        let cors_origins = std::env::var("ATHENAEUM_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("ATHENAEUM_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let cors_max_age_secs = std::env::var("ATHENAEUM_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let rate_limit_enabled = std::env::var("ATHENAEUM_RATE_LIMIT_ENABLED")
            .ok()
            .map(|s| !s.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        let rate_limit_unauthenticated = std::env::var("ATHENAEUM_RATE_LIMIT_UNAUTHENTICATED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_unauthenticated);

        let rate_limit_authenticated = std::env::var("ATHENAEUM_RATE_LIMIT_AUTHENTICATED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_authenticated);

        let rate_limit_burst = std::env::var("ATHENAEUM_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_burst);

        let cache_sweep_interval = Duration::from_secs(
            std::env::var("ATHENAEUM_CACHE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_sweep_interval.as_secs()),
        );

        Self {
            bind_host,
            bind_port,
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
            rate_limit_enabled,
            rate_limit_unauthenticated,
            rate_limit_authenticated,
            rate_limit_burst,
            cache_sweep_interval,
            pipeline: PipelineConfig::from_env(),
            db: PoolConfig::from_env(),
        }
    }

    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }
        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(pattern)
                        || origin_domain == pattern.strip_prefix('.').unwrap_or(pattern);
                }
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(config.rate_limit_enabled);
        assert_eq!(config.bind_port, 3000);
    }

    #[test]
    fn origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.example"));
    }

    #[test]
    fn origin_allowed_production() {
        let mut config = ApiConfig::default();
        config.cors_origins = vec!["https://athenaeum.dev".to_string()];
        assert!(config.is_production());
        assert!(config.is_origin_allowed("https://athenaeum.dev"));
        assert!(!config.is_origin_allowed("https://evil.example"));
    }

    #[test]
    fn wildcard_subdomain() {
        let mut config = ApiConfig::default();
        config.cors_origins = vec!["*.athenaeum.dev".to_string()];
        assert!(config.is_origin_allowed("https://app.athenaeum.dev"));
        assert!(!config.is_origin_allowed("https://evil.example"));
    }
}
