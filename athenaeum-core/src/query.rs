//! Query request shape (§3 Query Request).

use crate::filter::QueryFilters;
use serde::{Deserialize, Serialize};

/// Retrieval mode, shared by query requests, plans, and the retrieval
/// adapter (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Keyword,
    Semantic,
    Hybrid,
}

impl Default for RetrievalMode {
    fn default() -> Self {
        RetrievalMode::Hybrid
    }
}

/// A query as received at the HTTP boundary, before fingerprinting or
/// filter extraction. Immutable within a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueryRequest {
    pub raw_text: String,
    pub mode: Option<RetrievalMode>,
    pub limit: Option<i32>,
    pub filters: Option<QueryFilters>,
}

impl QueryRequest {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            mode: None,
            limit: None,
            filters: None,
        }
    }

    /// Result cap clamped to [1, 50] per §3.
    pub fn clamped_limit(&self) -> i32 {
        self.limit.unwrap_or(10).clamp(1, 50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_limit_into_range() {
        let mut req = QueryRequest::new("test");
        req.limit = Some(500);
        assert_eq!(req.clamped_limit(), 50);
        req.limit = Some(0);
        assert_eq!(req.clamped_limit(), 1);
        req.limit = None;
        assert_eq!(req.clamped_limit(), 10);
    }
}
