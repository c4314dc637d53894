//! Assembles the route surface (§6) behind CORS and rate-limit layers.

pub mod health;
pub mod search;
pub mod stream;

use axum::Router;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::rate_limit::{rate_limit_middleware, RateLimitState};
use crate::state::AppState;

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(tower_http::cors::Any)
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let config = config.clone();
        layer
            .allow_origin(AllowOrigin::predicate(move |origin, _| {
                origin.to_str().map(|o| config.is_origin_allowed(o)).unwrap_or(false)
            }))
            .allow_credentials(config.cors_allow_credentials)
    }
}

/// Builds the full `/search*` router, with CORS and (when enabled) HTTP
/// rate limiting applied around the merged route set.
pub fn build_router(state: AppState) -> Router {
    let rate_limit_state = RateLimitState::new(state.config.clone());
    let cors = cors_layer(&state.config);

    let api = Router::new()
        .merge(health::router())
        .merge(search::router())
        .merge(stream::router())
        .layer(axum::middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    api.with_state(state)
}
