//! Tracing bootstrap.
//!
//! No OpenTelemetry/Prometheus exporters here — just `tracing-subscriber`
//! writing structured JSON to stdout, the way a service without its own
//! observability backend logs (§ ambient stack: logging).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::ApiResult;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("ATHENAEUM_SERVICE_NAME").unwrap_or_else(|_| "athenaeum-api".to_string()),
            environment: std::env::var("ATHENAEUM_ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }
}

/// Initializes the global `tracing` subscriber. Call once at startup before
/// any other tracing occurs.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("athenaeum_api=debug,tower_http=debug,info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| crate::error::ApiError::internal_error(format!("failed to init tracing subscriber: {e}")))?;

    tracing::info!(
        service_name = config.service_name,
        environment = config.environment,
        "telemetry initialized"
    );
    Ok(())
}
