//! Uniform provider traits for the LLM Adapter (§4.4, §4.5): a buffered
//! and token-streaming chat interface, an embedding interface, and the
//! routing/circuit-breaker machinery that keeps a misbehaving provider
//! from being hammered.

pub mod providers;

use async_trait::async_trait;
use athenaeum_core::{AthenaeumError, AthenaeumResult, EmbeddingVector, LlmError};
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::RwLock as TokioRwLock;
use uuid::Uuid;

pub use providers::{AnthropicChatProvider, AnthropicClient, OllamaEmbeddingProvider};
pub use providers::{CombinedProviderAdapter, OpenAIChatProvider, OpenAIClient, OpenAIEmbeddingProvider};

// ============================================================================
// EMBEDDING PROVIDER (§4.4)
// ============================================================================

/// Converts text into a vector for semantic/hybrid retrieval. Isolated
/// so retrieval and tests can substitute an identity or hash-based
/// embedder (§4.4).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> AthenaeumResult<EmbeddingVector>;
    async fn embed_batch(&self, texts: &[&str]) -> AthenaeumResult<Vec<EmbeddingVector>>;
    fn dimensions(&self) -> i32;
    fn model_id(&self) -> &str;
}

// ============================================================================
// CHAT PROVIDER (§4.5)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub usage: Usage,
}

/// One token delta of a streamed chat response (§4.5: "normalizes the
/// chunk shape across providers into `{text}` deltas").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub text: String,
}

pub type ChatStream = BoxStream<'static, AthenaeumResult<ChatChunk>>;

/// Uniform chat interface over one or more providers (§4.5). `chat` is
/// buffered and used by the planner and analyzer; `chat_stream` is used
/// only by the introduction-streaming path.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> AthenaeumResult<ChatResponse>;
    async fn chat_stream(&self, messages: &[ChatMessage], opts: &ChatOptions) -> AthenaeumResult<ChatStream>;
}

/// Runs `fut` against `deadline`, mapping an expiry into `LlmError::Timeout`
/// (§4.5, §5).
pub async fn with_deadline<T>(
    provider: &str,
    deadline: Duration,
    fut: impl std::future::Future<Output = AthenaeumResult<T>>,
) -> AthenaeumResult<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AthenaeumError::Llm(LlmError::Timeout {
            provider: provider.to_string(),
            deadline_ms: deadline.as_millis() as i64,
        })),
    }
}

// ============================================================================
// PROVIDER CAPABILITIES & DISCOVERY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderCapability {
    Embedding,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct EchoRequest {
    pub capabilities: Vec<ProviderCapability>,
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl EchoRequest {
    pub fn new(capabilities: Vec<ProviderCapability>) -> Self {
        Self {
            capabilities,
            request_id: Uuid::now_v7(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PingResponse {
    pub provider_id: String,
    pub capabilities: Vec<ProviderCapability>,
    pub latency_ms: u64,
    pub health: ProviderHealth,
    pub metadata: HashMap<String, String>,
}

// ============================================================================
// PROVIDER ADAPTER (uniform, Echo/Ping-discoverable)
// ============================================================================

#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub text: String,
    pub request_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct EmbedResponse {
    pub embedding: EmbeddingVector,
    pub request_id: Uuid,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ChatCallRequest {
    pub messages: Vec<ChatMessage>,
    pub opts: ChatOptions,
    pub request_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ChatCallResponse {
    pub response: ChatResponse,
    pub request_id: Uuid,
    pub latency_ms: u64,
}

/// A provider registered with a [`ProviderRegistry`]: adapts a concrete
/// client (Anthropic, OpenAI, Ollama, ...) to a discoverable, routable
/// shape the registry can select between.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_id(&self) -> &str;
    fn capabilities(&self) -> &[ProviderCapability];
    async fn ping(&self) -> AthenaeumResult<PingResponse>;
    async fn embed(&self, request: EmbedRequest) -> AthenaeumResult<EmbedResponse>;
    async fn chat(&self, request: ChatCallRequest) -> AthenaeumResult<ChatCallResponse>;
}

// ============================================================================
// EVENT LISTENER
// ============================================================================

#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub request_id: Uuid,
    pub provider_id: String,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub request_id: Uuid,
    pub provider_id: String,
    pub operation: String,
    pub latency_ms: u64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub request_id: Uuid,
    pub provider_id: String,
    pub operation: String,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_request(&self, event: RequestEvent);
    async fn on_response(&self, event: ResponseEvent);
    async fn on_error(&self, event: ErrorEvent);
}

#[derive(Default)]
pub struct ListenerChain {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl ListenerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub async fn emit_request(&self, event: RequestEvent) {
        for listener in &self.listeners {
            listener.on_request(event.clone()).await;
        }
    }

    pub async fn emit_response(&self, event: ResponseEvent) {
        for listener in &self.listeners {
            listener.on_response(event.clone()).await;
        }
    }

    pub async fn emit_error(&self, event: ErrorEvent) {
        for listener in &self.listeners {
            listener.on_error(event.clone()).await;
        }
    }
}

// ============================================================================
// CIRCUIT BREAKER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Trips a provider out of rotation after repeated failures so the
/// planner/analyzer degrade a misbehaving provider rather than keep
/// hammering it (§9 Supplemented detail: provider routing).
pub struct CircuitBreaker {
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    last_failure: RwLock<Option<Instant>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            last_failure: RwLock::new(None),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_allowed(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Ok(guard) = self.last_failure.read() {
                    if let Some(last) = *guard {
                        if last.elapsed() > self.config.timeout {
                            self.state.store(CircuitState::HalfOpen as u8, Ordering::SeqCst);
                            return true;
                        }
                    }
                }
                false
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        if self.state() == CircuitState::HalfOpen {
            let count = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
            if count >= self.config.success_threshold {
                self.state.store(CircuitState::Closed as u8, Ordering::SeqCst);
                self.success_count.store(0, Ordering::SeqCst);
            }
        }
    }

    pub fn record_failure(&self) {
        self.success_count.store(0, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_failure.write() {
            *guard = Some(Instant::now());
        }
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.config.failure_threshold {
            self.state.store(CircuitState::Open as u8, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failure_count", &self.failure_count.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// ROUTING & REGISTRY
// ============================================================================

#[derive(Debug, Clone)]
pub enum RoutingStrategy {
    RoundRobin,
    LeastLatency,
    Random,
    Capability(ProviderCapability),
    First,
}

/// Registry of LLM providers with capability-aware routing and
/// per-provider circuit breaking. Planner and analyzer calls go through
/// this rather than talking to a concrete client directly.
pub struct ProviderRegistry {
    adapters: TokioRwLock<HashMap<String, Arc<dyn ProviderAdapter>>>,
    routing_strategy: RoutingStrategy,
    round_robin_index: AtomicU64,
    listeners: TokioRwLock<ListenerChain>,
    circuit_breakers: TokioRwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl ProviderRegistry {
    pub fn new(routing_strategy: RoutingStrategy) -> Self {
        Self {
            adapters: TokioRwLock::new(HashMap::new()),
            routing_strategy,
            round_robin_index: AtomicU64::new(0),
            listeners: TokioRwLock::new(ListenerChain::new()),
            circuit_breakers: TokioRwLock::new(HashMap::new()),
        }
    }

    pub fn with_round_robin() -> Self {
        Self::new(RoutingStrategy::RoundRobin)
    }

    pub async fn register(&self, adapter: Arc<dyn ProviderAdapter>) {
        let id = adapter.provider_id().to_string();
        self.adapters.write().await.insert(id.clone(), adapter);
        self.circuit_breakers
            .write()
            .await
            .insert(id, Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())));
    }

    pub async fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().await.add(listener);
    }

    pub async fn has_providers(&self) -> bool {
        !self.adapters.read().await.is_empty()
    }

    async fn select_provider(
        &self,
        capability: ProviderCapability,
    ) -> AthenaeumResult<Arc<dyn ProviderAdapter>> {
        let adapters = self.adapters.read().await;
        let breakers = self.circuit_breakers.read().await;

        let available: Vec<_> = adapters
            .iter()
            .filter(|(id, adapter)| {
                adapter.capabilities().contains(&capability)
                    && breakers.get(*id).map(|cb| cb.is_allowed()).unwrap_or(true)
            })
            .collect();

        if available.is_empty() {
            return Err(AthenaeumError::Llm(LlmError::ProviderNotConfigured));
        }

        let selected = match &self.routing_strategy {
            RoutingStrategy::First | RoutingStrategy::Capability(_) => {
                available.first().map(|(_, a)| Arc::clone(a))
            }
            RoutingStrategy::RoundRobin => {
                let idx = self.round_robin_index.fetch_add(1, Ordering::Relaxed) as usize
                    % available.len();
                available.get(idx).map(|(_, a)| Arc::clone(a))
            }
            RoutingStrategy::Random => {
                let seed = std::time::SystemTime::now()
                    .duration_since(std::time::SystemTime::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as usize;
                available.get(seed % available.len()).map(|(_, a)| Arc::clone(a))
            }
            RoutingStrategy::LeastLatency => available.first().map(|(_, a)| Arc::clone(a)),
        };

        selected.ok_or(AthenaeumError::Llm(LlmError::ProviderNotConfigured))
    }

    pub async fn embed(&self, text: &str) -> AthenaeumResult<EmbeddingVector> {
        let provider = self.select_provider(ProviderCapability::Embedding).await?;
        let provider_id = provider.provider_id().to_string();
        let request_id = Uuid::now_v7();

        let start = Instant::now();
        let result = provider
            .embed(EmbedRequest {
                text: text.to_string(),
                request_id,
            })
            .await;
        self.record_outcome(&provider_id, "embed", request_id, start.elapsed(), &result)
            .await;
        result.map(|r| r.embedding)
    }

    /// Buffered chat call, wrapped with `deadline` (§4.5, §5).
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
        deadline: Duration,
    ) -> AthenaeumResult<ChatResponse> {
        let provider = self.select_provider(ProviderCapability::Chat).await?;
        let provider_id = provider.provider_id().to_string();
        let request_id = Uuid::now_v7();

        let start = Instant::now();
        let call = provider.chat(ChatCallRequest {
            messages: messages.to_vec(),
            opts: opts.clone(),
            request_id,
        });
        let result = with_deadline(&provider_id, deadline, call).await;
        self.record_outcome(&provider_id, "chat", request_id, start.elapsed(), &result)
            .await;
        result.map(|r| r.response)
    }

    async fn record_outcome<T>(
        &self,
        provider_id: &str,
        operation: &str,
        request_id: Uuid,
        elapsed: Duration,
        result: &AthenaeumResult<T>,
    ) {
        let breakers = self.circuit_breakers.read().await;
        if let Some(cb) = breakers.get(provider_id) {
            match result {
                Ok(_) => cb.record_success(),
                Err(_) => cb.record_failure(),
            }
        }
        drop(breakers);

        let listeners = self.listeners.read().await;
        match result {
            Ok(_) => {
                listeners
                    .emit_response(ResponseEvent {
                        request_id,
                        provider_id: provider_id.to_string(),
                        operation: operation.to_string(),
                        latency_ms: elapsed.as_millis() as u64,
                        success: true,
                        timestamp: Utc::now(),
                    })
                    .await;
            }
            Err(e) => {
                listeners
                    .emit_error(ErrorEvent {
                        request_id,
                        provider_id: provider_id.to_string(),
                        operation: operation.to_string(),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    })
                    .await;
            }
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("routing_strategy", &self.routing_strategy)
            .finish()
    }
}

// ============================================================================
// MOCK PROVIDERS (used in tests across the workspace)
// ============================================================================

/// Deterministic hash-based embedder, substitutable for a real provider
/// in tests (§4.4).
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    model_id: String,
    dimensions: i32,
}

impl MockEmbeddingProvider {
    pub fn new(model_id: impl Into<String>, dimensions: i32) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions,
        }
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut data = vec![0.0f32; self.dimensions as usize];
        for (i, byte) in text.bytes().enumerate() {
            let idx = i % self.dimensions as usize;
            data[idx] += (byte as f32) / 255.0;
        }
        let norm: f32 = data.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut data {
                *x /= norm;
            }
        }
        data
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> AthenaeumResult<EmbeddingVector> {
        Ok(EmbeddingVector::new(self.generate(text), self.model_id.clone()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> AthenaeumResult<Vec<EmbeddingVector>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> i32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Canned chat provider for tests: echoes a fixed reply regardless of
/// input, used to exercise the planner/analyzer failure-degradation
/// paths without live network calls.
pub struct MockChatProvider {
    pub reply: String,
}

impl MockChatProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn chat(&self, _messages: &[ChatMessage], opts: &ChatOptions) -> AthenaeumResult<ChatResponse> {
        Ok(ChatResponse {
            content: self.reply.clone(),
            model: opts.model.clone(),
            usage: Usage::default(),
        })
    }

    async fn chat_stream(&self, messages: &[ChatMessage], opts: &ChatOptions) -> AthenaeumResult<ChatStream> {
        let response = self.chat(messages, opts).await?;
        let words: Vec<String> = response.content.split(' ').map(|w| format!("{w} ")).collect();
        let stream = async_stream::stream! {
            for word in words {
                yield Ok(ChatChunk { text: word });
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn mock_embedding_is_deterministic() {
        let provider = MockEmbeddingProvider::new("test-model", 384);
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(a.dimensions, 384);
    }

    #[tokio::test]
    async fn mock_chat_stream_reassembles_to_buffered_reply() {
        let provider = MockChatProvider::new("Found 3 passages.");
        let opts = ChatOptions {
            model: "mock".into(),
            temperature: None,
            max_tokens: 100,
        };
        let mut stream = provider.chat_stream(&[], &opts).await.unwrap();
        let mut assembled = String::new();
        while let Some(chunk) = stream.next().await {
            assembled.push_str(&chunk.unwrap().text);
        }
        assert_eq!(assembled.trim(), "Found 3 passages.");
    }

    #[tokio::test]
    async fn registry_routes_to_only_registered_provider() {
        struct EmbedOnlyAdapter(MockEmbeddingProvider);

        #[async_trait]
        impl ProviderAdapter for EmbedOnlyAdapter {
            fn provider_id(&self) -> &str {
                "mock"
            }
            fn capabilities(&self) -> &[ProviderCapability] {
                &[ProviderCapability::Embedding]
            }
            async fn ping(&self) -> AthenaeumResult<PingResponse> {
                Ok(PingResponse {
                    provider_id: "mock".into(),
                    capabilities: vec![ProviderCapability::Embedding],
                    latency_ms: 1,
                    health: ProviderHealth::Healthy,
                    metadata: HashMap::new(),
                })
            }
            async fn embed(&self, request: EmbedRequest) -> AthenaeumResult<EmbedResponse> {
                let embedding = self.0.embed(&request.text).await?;
                Ok(EmbedResponse {
                    embedding,
                    request_id: request.request_id,
                    latency_ms: 0,
                })
            }
            async fn chat(&self, _request: ChatCallRequest) -> AthenaeumResult<ChatCallResponse> {
                Err(AthenaeumError::Llm(LlmError::ProviderNotConfigured))
            }
        }

        let registry = ProviderRegistry::with_round_robin();
        registry
            .register(Arc::new(EmbedOnlyAdapter(MockEmbeddingProvider::new("mock", 8))))
            .await;

        assert!(registry.embed("hello").await.is_ok());
        assert!(registry
            .chat(
                &[ChatMessage::user("hi")],
                &ChatOptions {
                    model: "mock".into(),
                    temperature: None,
                    max_tokens: 10,
                },
                Duration::from_secs(1),
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_failure_threshold() {
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_millis(100),
        };
        let cb = CircuitBreaker::new(config);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.is_allowed());
    }
}
