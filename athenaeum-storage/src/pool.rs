//! `deadpool-postgres` pool construction from environment variables.

use athenaeum_core::{AthenaeumError, AthenaeumResult, ConfigError};
use deadpool_postgres::{Config as DeadpoolConfig, Pool, Runtime};
use tokio_postgres::NoTls;

/// Connection settings for the Postgres-backed stores. Every field has a
/// default so `PoolConfig::from_env()` in a fresh environment still produces
/// a usable config (pointed at `localhost`).
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub dbname: String,
    pub max_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "athenaeum".to_string(),
            password: None,
            dbname: "athenaeum".to_string(),
            max_size: 16,
        }
    }
}

impl PoolConfig {
    /// Builds from environment variables, falling back to
    /// [`PoolConfig::default`] for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("ATHENAEUM_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("ATHENAEUM_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            user: std::env::var("ATHENAEUM_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("ATHENAEUM_DB_PASSWORD").ok(),
            dbname: std::env::var("ATHENAEUM_DB_NAME").unwrap_or(defaults.dbname),
            max_size: std::env::var("ATHENAEUM_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
        }
    }
}

/// Builds a `deadpool-postgres` pool from a [`PoolConfig`].
pub fn build_pool(config: &PoolConfig) -> AthenaeumResult<Pool> {
    let mut cfg = DeadpoolConfig::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = config.password.clone();
    cfg.dbname = Some(config.dbname.clone());
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.max_size));

    cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
        AthenaeumError::Config(ConfigError::InvalidValue {
            field: "database".to_string(),
            value: format!("{}:{}/{}", config.host, config.port, config.dbname),
            reason: e.to_string(),
        })
    })
}
