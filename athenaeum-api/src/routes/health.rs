//! `GET /search/stats` and `GET /search/health` (§6).
//!
//! No authentication required — liveness/readiness probes run unauthenticated
//! the way the teacher's `/health/*` endpoints do.

use athenaeum_core::{HealthCheck, HealthStatus, QueryFilters, RetrievalMode};
use athenaeum_pipeline::RetrievalParams;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
struct StatsResponse {
    server_version: String,
    uptime_seconds: u64,
    index: HealthCheck,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
struct HealthResponse {
    status: &'static str,
    checks: Vec<HealthCheck>,
}

/// `GET /search/stats`: a lightweight probe against the retrieval adapter
/// plus the running build's version, not a persisted metrics surface.
async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let index = probe_index(&state).await;
    Json(StatsResponse {
        server_version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        index,
    })
}

/// `GET /search/health`: liveness of the retrieval index and the LLM
/// adapter (§6). Never blocks on a real query — a cheap probe call only.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let index_check = probe_index(&state).await;
    let llm_check = probe_llm(&state).await;

    let overall_healthy =
        index_check.status == HealthStatus::Healthy && llm_check.status == HealthStatus::Healthy;

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if overall_healthy { "healthy" } else { "degraded" },
            checks: vec![index_check, llm_check],
        }),
    )
}

async fn probe_index(state: &AppState) -> HealthCheck {
    let start = std::time::Instant::now();
    let params = RetrievalParams::new(QueryFilters::default(), 1);
    match state
        .retrieval_adapter
        .retrieve(RetrievalMode::Keyword, "", &params)
        .await
    {
        Ok(_) => HealthCheck::healthy("retrieval_index")
            .with_response_time(start.elapsed().as_millis() as i64),
        Err(e) => HealthCheck::unhealthy("retrieval_index", e.to_string())
            .with_response_time(start.elapsed().as_millis() as i64),
    }
}

async fn probe_llm(state: &AppState) -> HealthCheck {
    if state.registry.has_providers().await {
        HealthCheck::healthy("llm_adapter")
    } else {
        HealthCheck::unhealthy("llm_adapter", "no chat/embedding providers registered")
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search/stats", get(stats))
        .route("/search/health", get(health))
}
