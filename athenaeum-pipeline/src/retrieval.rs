//! Retrieval Adapter (§4.3): a thin, typed facade over the full-text +
//! vector index. Keyword, semantic, and hybrid modes sit behind one
//! trait so the fan-out executor never branches on mode; filter
//! composition (structured predicates conjoined with a text-contains
//! disjunction) happens once, here, rather than in every caller.

use async_trait::async_trait;
use athenaeum_core::{
    AthenaeumResult, CandidatePassage, EmbeddingVector, QueryFilters, RetrievalMode,
};
use std::time::Duration;

/// Per-call retrieval parameters (§4.3).
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub filters: QueryFilters,
    pub limit: i32,
    /// Blend ratio for hybrid mode; ignored by keyword/semantic (§4.3 default 0.5).
    pub semantic_ratio: f32,
    /// Pre-computed query embedding. If absent and the mode needs one,
    /// the adapter is responsible for obtaining it via the embedding provider.
    pub embedding: Option<EmbeddingVector>,
}

impl RetrievalParams {
    pub fn new(filters: QueryFilters, limit: i32) -> Self {
        Self {
            filters,
            limit,
            semantic_ratio: 0.5,
            embedding: None,
        }
    }

    pub fn with_semantic_ratio(mut self, ratio: f32) -> Self {
        self.semantic_ratio = ratio;
        self
    }

    pub fn with_embedding(mut self, embedding: EmbeddingVector) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub hits: Vec<CandidatePassage>,
    pub total_estimated: i64,
    pub timing: Duration,
}

/// Uniform interface over the index regardless of mode (§4.3).
///
/// Errors surface as [`athenaeum_core::IndexError::Unavailable`] (transient,
/// retried once by the fan-out executor) or
/// [`athenaeum_core::IndexError::BadRequest`] (fatal for the call). Empty
/// result sets are not errors.
#[async_trait]
pub trait RetrievalAdapter: Send + Sync {
    async fn retrieve(
        &self,
        mode: RetrievalMode,
        query_text: &str,
        params: &RetrievalParams,
    ) -> AthenaeumResult<RetrievalOutcome>;
}

/// In-memory paragraph index for tests and local/dev runs without a real
/// search backend. Keyword matching is a case-insensitive substring test;
/// "semantic" mode is approximated by the same matcher since there's no
/// real vector index to query — good enough to exercise the pipeline's
/// merge/rank/highlight logic without a production dependency.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRetrievalAdapter {
    passages: Vec<CandidatePassage>,
}

impl InMemoryRetrievalAdapter {
    pub fn new(passages: Vec<CandidatePassage>) -> Self {
        Self { passages }
    }

    fn matches_filters(passage: &CandidatePassage, filters: &QueryFilters) -> bool {
        if let Some(ref tradition) = filters.tradition {
            if &passage.tradition != tradition {
                return false;
            }
        }
        if let Some(ref collection) = filters.collection {
            if &passage.collection != collection {
                return false;
            }
        }
        if let Some(ref language) = filters.language {
            if &passage.language != language {
                return false;
            }
        }
        if let Some(year_min) = filters.year_min {
            if passage.year.is_none_or(|y| y < year_min) {
                return false;
            }
        }
        if let Some(year_max) = filters.year_max {
            if passage.year.is_none_or(|y| y > year_max) {
                return false;
            }
        }
        if let Some(ref document_id) = filters.document_id {
            if &passage.document_id != document_id {
                return false;
            }
        }
        if filters.has_text_contains() {
            let haystacks = [&passage.author, &passage.collection, &passage.title];
            let any_term_matches = filters.text_contains.iter().any(|term| {
                let term = term.to_lowercase();
                haystacks
                    .iter()
                    .any(|h| h.to_lowercase().contains(&term))
            });
            if !any_term_matches {
                return false;
            }
        }
        true
    }

    fn keyword_match(passage: &CandidatePassage, query_text: &str) -> bool {
        let query_text = query_text.to_lowercase();
        if query_text.trim().is_empty() {
            return true;
        }
        query_text
            .split_whitespace()
            .any(|word| passage.text.to_lowercase().contains(word))
    }
}

#[async_trait]
impl RetrievalAdapter for InMemoryRetrievalAdapter {
    async fn retrieve(
        &self,
        _mode: RetrievalMode,
        query_text: &str,
        params: &RetrievalParams,
    ) -> AthenaeumResult<RetrievalOutcome> {
        let hits: Vec<CandidatePassage> = self
            .passages
            .iter()
            .filter(|p| Self::matches_filters(p, &params.filters))
            .filter(|p| Self::keyword_match(p, query_text))
            .take(params.limit.max(0) as usize)
            .cloned()
            .collect();

        Ok(RetrievalOutcome {
            total_estimated: hits.len() as i64,
            hits,
            timing: Duration::from_millis(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: &str, title: &str, text: &str, tradition: &str) -> CandidatePassage {
        CandidatePassage {
            id: id.to_string(),
            document_id: format!("doc-{id}"),
            paragraph_index: 0,
            text: text.to_string(),
            title: title.to_string(),
            author: "Author".to_string(),
            tradition: tradition.to_string(),
            collection: "Collection".to_string(),
            language: "en".to_string(),
            year: Some(1950),
            provenance_query: String::new(),
        }
    }

    #[tokio::test]
    async fn keyword_mode_matches_substring() {
        let adapter = InMemoryRetrievalAdapter::new(vec![
            passage("1", "On Justice", "justice is a virtue", "tradition-a"),
            passage("2", "On Mercy", "mercy tempers judgment", "tradition-a"),
        ]);

        let params = RetrievalParams::new(QueryFilters::default(), 10);
        let outcome = adapter
            .retrieve(RetrievalMode::Keyword, "justice", &params)
            .await
            .unwrap();

        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].id, "1");
    }

    #[tokio::test]
    async fn structured_filter_narrows_results() {
        let adapter = InMemoryRetrievalAdapter::new(vec![
            passage("1", "On Justice", "justice is a virtue", "tradition-a"),
            passage("2", "On Justice Too", "justice and law", "tradition-b"),
        ]);

        let mut filters = QueryFilters::default();
        filters.tradition = Some("tradition-b".to_string());
        let params = RetrievalParams::new(filters, 10);

        let outcome = adapter
            .retrieve(RetrievalMode::Hybrid, "justice", &params)
            .await
            .unwrap();

        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].id, "2");
    }

    #[tokio::test]
    async fn text_contains_is_a_disjunction_over_provenance_fields() {
        let mut p1 = passage("1", "On Justice", "justice is a virtue", "tradition-a");
        p1.author = "Shoghi Effendi".to_string();
        let p2 = passage("2", "On Justice Too", "justice and law", "tradition-a");

        let adapter = InMemoryRetrievalAdapter::new(vec![p1, p2]);
        let mut filters = QueryFilters::default();
        filters.text_contains = vec!["shoghi".to_string()];
        let params = RetrievalParams::new(filters, 10);

        let outcome = adapter
            .retrieve(RetrievalMode::Keyword, "justice", &params)
            .await
            .unwrap();

        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].id, "1");
    }

    #[tokio::test]
    async fn limit_caps_hit_count() {
        let adapter = InMemoryRetrievalAdapter::new(vec![
            passage("1", "A", "justice", "t"),
            passage("2", "B", "justice", "t"),
            passage("3", "C", "justice", "t"),
        ]);
        let params = RetrievalParams::new(QueryFilters::default(), 2);
        let outcome = adapter
            .retrieve(RetrievalMode::Keyword, "justice", &params)
            .await
            .unwrap();
        assert_eq!(outcome.hits.len(), 2);
    }
}
