//! Shared test infrastructure for the Athenaeum workspace:
//! - Proptest generators for the core domain types
//! - Mock LLM/retrieval fixtures wired into ready-to-use registries
//! - Pre-built fixtures for common scenarios (candidates, identities, plans)
//! - Custom assertions for Athenaeum-specific result types

pub use athenaeum_core::*;
pub use athenaeum_llm::{
    ChatMessage, ChatOptions, ChatResponse, MockChatProvider, MockEmbeddingProvider,
    ProviderRegistry,
};
pub use athenaeum_pipeline::{InMemoryRetrievalAdapter, RetrievalAdapter};
pub use athenaeum_storage::{InMemoryCacheStore, InMemoryMemoryStore, InMemoryQuotaStore};

use async_trait::async_trait;
use athenaeum_llm::{
    ChatCallRequest, ChatCallResponse, EmbedRequest, EmbedResponse, PingResponse,
    ProviderAdapter, ProviderCapability, ProviderHealth,
};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// MOCK PROVIDER WIRING
// ============================================================================

/// Adapts [`MockEmbeddingProvider`] + [`MockChatProvider`] into a single
/// [`ProviderAdapter`] a [`ProviderRegistry`] can route to — the same shape
/// as the `EmbedOnlyAdapter` exercised in athenaeum-llm's own tests, just
/// covering both capabilities so one mock can stand in for planner,
/// analyzer, and embedding calls at once.
pub struct MockProviderAdapter {
    id: String,
    embeddings: MockEmbeddingProvider,
    chat: MockChatProvider,
}

impl MockProviderAdapter {
    pub fn new(id: impl Into<String>, chat_reply: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            embeddings: MockEmbeddingProvider::new("mock-embed", 384),
            chat: MockChatProvider::new(chat_reply),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &[ProviderCapability] {
        &[ProviderCapability::Embedding, ProviderCapability::Chat]
    }

    async fn ping(&self) -> AthenaeumResult<PingResponse> {
        Ok(PingResponse {
            provider_id: self.id.clone(),
            capabilities: self.capabilities().to_vec(),
            latency_ms: 1,
            health: ProviderHealth::Healthy,
            metadata: HashMap::new(),
        })
    }

    async fn embed(&self, request: EmbedRequest) -> AthenaeumResult<EmbedResponse> {
        let embedding = athenaeum_llm::EmbeddingProvider::embed(&self.embeddings, &request.text).await?;
        Ok(EmbedResponse {
            embedding,
            request_id: request.request_id,
            latency_ms: 0,
        })
    }

    async fn chat(&self, request: ChatCallRequest) -> AthenaeumResult<ChatCallResponse> {
        let response = athenaeum_llm::ChatProvider::chat(&self.chat, &request.messages, &request.opts).await?;
        Ok(ChatCallResponse {
            response,
            request_id: request.request_id,
            latency_ms: 0,
        })
    }
}

/// Builds a [`ProviderRegistry`] with one mock provider registered, for
/// planner/analyzer tests that need `chat()`/`embed()` to resolve without
/// a live network call. `reply` is returned verbatim from every chat call
/// and should usually already be a JSON string matching the caller's
/// expected shape (plan JSON, batch-result JSON, ...).
pub async fn mock_registry(reply: impl Into<String>) -> Arc<ProviderRegistry> {
    let registry = Arc::new(ProviderRegistry::with_round_robin());
    registry
        .register(Arc::new(MockProviderAdapter::new("mock", reply)))
        .await;
    registry
}

/// A registry with no providers registered at all — exercises the
/// planner/analyzer failure-degradation paths (§4.6, §4.8), where every
/// call fails with `ProviderNotConfigured`.
pub fn empty_registry() -> Arc<ProviderRegistry> {
    Arc::new(ProviderRegistry::with_round_robin())
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for the core domain types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random id-shaped string, used wherever a candidate or
    /// document id just needs to be unique, not a real `Uuid`.
    pub fn arb_id() -> impl Strategy<Value = String> {
        "[a-f0-9]{8}-[a-f0-9]{4}".prop_map(|s| s)
    }

    pub fn arb_tradition() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("bahai".to_string()),
            Just("buddhist".to_string()),
            Just("christian".to_string()),
            Just("islamic".to_string()),
            Just("jewish".to_string()),
            Just("stoic".to_string()),
        ]
    }

    pub fn arb_retrieval_mode() -> impl Strategy<Value = RetrievalMode> {
        prop_oneof![
            Just(RetrievalMode::Keyword),
            Just(RetrievalMode::Semantic),
            Just(RetrievalMode::Hybrid),
        ]
    }

    pub fn arb_tier() -> impl Strategy<Value = Tier> {
        prop_oneof![
            Just(Tier::Banned),
            Just(Tier::Verified),
            Just(Tier::Approved),
            Just(Tier::Patron),
            Just(Tier::Institutional),
            Just(Tier::Admin),
        ]
    }

    /// Generate a `QueryFilters` with independently-optional structured
    /// fields and a small `text_contains` list, matching the shapes
    /// `extract_text_contains` and `intersect` actually operate on.
    pub fn arb_query_filters() -> impl Strategy<Value = QueryFilters> {
        (
            prop::option::of(arb_tradition()),
            prop::option::of("[a-z]{3,10}".prop_map(|s| s)),
            prop::option::of("[a-z]{2}".prop_map(|s| s)),
            prop::option::of(1800i32..2024),
            prop::option::of(1800i32..2024),
            prop::option::of(arb_id()),
            prop::collection::vec("[a-z]{3,8}".prop_map(|s| s), 0..3),
        )
            .prop_map(
                |(tradition, collection, language, year_min, year_max, document_id, text_contains)| {
                    QueryFilters {
                        tradition,
                        collection,
                        language,
                        year_min,
                        year_max,
                        document_id,
                        text_contains,
                    }
                },
            )
    }

    /// Generate a `CandidatePassage` with a caller-supplied id so tests can
    /// control dedup/ordering behavior deterministically while still
    /// randomizing the rest of the fields.
    pub fn arb_candidate_with_id(id: String) -> impl Strategy<Value = CandidatePassage> {
        (
            arb_tradition(),
            "[a-zA-Z0-9 .,]{10,200}".prop_map(|s| s),
            "[A-Z][a-z]{2,12}".prop_map(|s| s),
            "[A-Z][a-z]{2,12}".prop_map(|s| s),
            prop::option::of(1200i32..2024),
            0i32..50,
        )
            .prop_map(move |(tradition, text, title, author, year, paragraph_index)| {
                CandidatePassage {
                    id: id.clone(),
                    document_id: format!("doc-{id}"),
                    paragraph_index,
                    text,
                    title,
                    author,
                    tradition,
                    collection: "collection".to_string(),
                    language: "en".to_string(),
                    year,
                    provenance_query: String::new(),
                }
            })
    }

    pub fn arb_candidate() -> impl Strategy<Value = CandidatePassage> {
        arb_id().prop_flat_map(arb_candidate_with_id)
    }

    pub fn arb_candidates(count: std::ops::Range<usize>) -> impl Strategy<Value = Vec<CandidatePassage>> {
        prop::collection::vec(arb_candidate(), count)
    }

    /// Generate an authenticated or anonymous `Identity`, including the
    /// anonymous-without-an-id unmetered case (§4.2).
    pub fn arb_identity() -> impl Strategy<Value = Identity> {
        prop_oneof![
            ("[a-z0-9]{6,12}".prop_map(|s| s), arb_tier(), 0i64..1000,).prop_map(
                |(subject_id, tier, search_count)| Identity::Authenticated {
                    subject_id,
                    tier,
                    search_count,
                }
            ),
            (
                prop::option::of("user_[a-z0-9]{8,16}".prop_map(|s| s)),
                0i64..1000,
            )
                .prop_map(|(opaque_id, search_count)| Identity::Anonymous {
                    opaque_id,
                    user_agent: None,
                    search_count,
                }),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built, deterministic fixtures for common test scenarios.

    use super::*;
    use chrono::Utc;

    /// A small, hand-authored passage set spanning a few traditions, used
    /// wherever a test needs realistic-looking retrieval hits without
    /// proptest's randomization.
    pub fn sample_candidates() -> Vec<CandidatePassage> {
        vec![
            candidate("1", "bahai", "On Justice", "Shoghi Effendi", "Justice is the light of the world."),
            candidate("2", "stoic", "Meditations", "Marcus Aurelius", "Justice is the crown of the virtues."),
            candidate("3", "buddhist", "On Compassion", "Thich Nhat Hanh", "Compassion is the root of justice."),
        ]
    }

    pub fn candidate(id: &str, tradition: &str, title: &str, author: &str, text: &str) -> CandidatePassage {
        CandidatePassage {
            id: id.to_string(),
            document_id: format!("doc-{id}"),
            paragraph_index: 0,
            text: text.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            tradition: tradition.to_string(),
            collection: "collection".to_string(),
            language: "en".to_string(),
            year: Some(1950),
            provenance_query: String::new(),
        }
    }

    pub fn verified_identity(subject_id: &str) -> Identity {
        Identity::Authenticated {
            subject_id: subject_id.to_string(),
            tier: Tier::Verified,
            search_count: 0,
        }
    }

    pub fn anonymous_identity(opaque_id: &str) -> Identity {
        Identity::Anonymous {
            opaque_id: Some(opaque_id.to_string()),
            user_agent: Some("test-agent".to_string()),
            search_count: 0,
        }
    }

    /// A minimal one-query `Plan::Simple`, useful wherever a test needs a
    /// plan without exercising the planner's LLM call.
    pub fn simple_plan(query_text: &str) -> Plan {
        Plan::Simple {
            reasoning: "test plan".to_string(),
            queries: vec![SubQuery::fallback(query_text)],
            semantic_note: None,
        }
    }

    pub fn fresh_cached_response(query: &str, plan: Plan, sources: Vec<AnnotatedPassage>) -> CachedResponse {
        let now = Utc::now();
        CachedResponse {
            query_hash: fingerprint(query),
            normalized_query: normalize(query),
            plan,
            sources,
            introduction: "Found passages matching your query.".to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
            hit_count: 0,
            last_hit_at: None,
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion helpers for Athenaeum-specific result types.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &AthenaeumResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &AthenaeumResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_soft_error<T: std::fmt::Debug>(result: &AthenaeumResult<T>) {
        match result {
            Err(e) if e.is_soft() => {}
            other => panic!("Expected a soft (cache/memory) error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_quota_denied(decision: &QuotaDecision) {
        assert!(!decision.allowed, "Expected quota decision to deny, got: {:?}", decision);
    }

    #[track_caller]
    pub fn assert_quota_allowed(decision: &QuotaDecision) {
        assert!(decision.allowed, "Expected quota decision to allow, got: {:?}", decision);
    }

    #[track_caller]
    pub fn assert_valid_embedding(embedding: &EmbeddingVector) {
        assert!(
            embedding.is_valid(),
            "Invalid embedding: dimensions={}, data.len()={}",
            embedding.dimensions,
            embedding.data.len()
        );
    }

    /// Asserts `passages` is sorted by score descending (ties allowed),
    /// the total order the analyzer's merge step guarantees (§4.8, §8).
    #[track_caller]
    pub fn assert_sorted_by_score_desc(passages: &[AnnotatedPassage]) {
        for window in passages.windows(2) {
            assert!(
                window[0].score >= window[1].score,
                "Expected descending score order, found {} before {}",
                window[0].score,
                window[1].score
            );
        }
    }

    /// Asserts every id in `passages` is unique, the merge invariant the
    /// fan-out executor's dedup step guarantees (§4.7, §8).
    #[track_caller]
    pub fn assert_no_duplicate_ids(passages: &[CandidatePassage]) {
        let mut seen = std::collections::HashSet::new();
        for passage in passages {
            assert!(seen.insert(&passage.id), "Duplicate candidate id: {}", passage.id);
        }
    }

    /// Asserts highlighted text never drops characters relative to the
    /// original beyond the `<mark>`/`<b>` markup itself (§9 "fails open").
    #[track_caller]
    pub fn assert_highlight_preserves_text(original: &str, highlighted: &str) {
        let stripped = highlighted
            .replace("<mark>", "")
            .replace("</mark>", "")
            .replace("<b>", "")
            .replace("</b>", "");
        assert_eq!(stripped, original, "Highlighting altered the underlying text");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn mock_registry_resolves_chat_and_embed() {
        let registry = mock_registry(r#"{"ok":true}"#).await;
        let messages = vec![ChatMessage::user("hi")];
        let opts = ChatOptions {
            model: "mock".to_string(),
            temperature: None,
            max_tokens: 10,
        };
        let response = registry.chat(&messages, &opts, std::time::Duration::from_secs(5)).await;
        assertions::assert_ok(&response);
        assert_eq!(response.unwrap().content, r#"{"ok":true}"#);

        let embedding = registry.embed("hello").await;
        assertions::assert_ok(&embedding);
    }

    #[tokio::test]
    async fn empty_registry_has_no_providers() {
        let registry = empty_registry();
        assert!(!registry.has_providers().await);
    }

    #[test]
    fn sample_candidates_fixture_has_no_duplicate_ids() {
        assertions::assert_no_duplicate_ids(&fixtures::sample_candidates());
    }

    #[test]
    fn fresh_cached_response_is_live() {
        let plan = fixtures::simple_plan("justice");
        let cached = fixtures::fresh_cached_response("justice", plan, vec![]);
        assert!(cached.is_live(chrono::Utc::now()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_candidates_have_valid_ids(candidates in generators::arb_candidates(0..10)) {
            for c in &candidates {
                prop_assert!(!c.id.is_empty());
            }
        }

        #[test]
        fn prop_generated_identity_counter_key_is_stable(identity in generators::arb_identity()) {
            let key1 = identity.counter_key();
            let key2 = identity.counter_key();
            prop_assert_eq!(key1, key2);
        }

        #[test]
        fn prop_generated_filters_roundtrip_through_intersect(filters in generators::arb_query_filters()) {
            let other = QueryFilters::default();
            let composed = filters.intersect(&other);
            prop_assert_eq!(composed.tradition, filters.tradition);
        }
    }
}
