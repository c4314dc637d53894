//! HTTP/SSE surface for the Athenaeum scholarly search service (§6).
//!
//! Three routes drive the whole external contract: buffered `/search` and
//! `/search/analyze`, and the streaming `/search/analyze/stream`. Identity
//! resolution (`auth`), HTTP-layer rate limiting (`rate_limit`), and the
//! background cache sweep (`jobs`) are the ambient concerns around that
//! surface; `athenaeum-pipeline` owns everything query-time.

pub mod auth;
pub mod config;
pub mod error;
pub mod jobs;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::build_router;
pub use state::AppState;
pub use telemetry::{init_tracing, TelemetryConfig};
