//! Adapts a concrete [`ChatProvider`]/[`EmbeddingProvider`] pair to the
//! registry-facing [`ProviderAdapter`] shape (§4.4, §4.5). Either half may
//! be absent — a provider that only does embeddings (Ollama) or only does
//! chat (Anthropic) simply advertises the one capability it has.

use async_trait::async_trait;
use athenaeum_core::{AthenaeumError, AthenaeumResult, LlmError};
use std::time::Instant;
use uuid::Uuid;

use crate::{
    ChatCallRequest, ChatCallResponse, ChatProvider, EmbedRequest, EmbedResponse, EmbeddingProvider,
    PingResponse, ProviderAdapter, ProviderCapability, ProviderHealth,
};

/// Wraps up to one [`ChatProvider`] and one [`EmbeddingProvider`] behind a
/// single `provider_id`, the shape [`athenaeum_llm::ProviderRegistry`]
/// expects one concrete client (OpenAI, Anthropic, Ollama, ...) to take.
pub struct CombinedProviderAdapter {
    provider_id: String,
    chat: Option<Box<dyn ChatProvider>>,
    embedding: Option<Box<dyn EmbeddingProvider>>,
    capabilities: Vec<ProviderCapability>,
}

impl CombinedProviderAdapter {
    pub fn new(provider_id: impl Into<String>, chat: Option<Box<dyn ChatProvider>>, embedding: Option<Box<dyn EmbeddingProvider>>) -> Self {
        let mut capabilities = Vec::new();
        if chat.is_some() {
            capabilities.push(ProviderCapability::Chat);
        }
        if embedding.is_some() {
            capabilities.push(ProviderCapability::Embedding);
        }
        Self {
            provider_id: provider_id.into(),
            chat,
            embedding,
            capabilities,
        }
    }

    pub fn chat_only(provider_id: impl Into<String>, chat: impl ChatProvider + 'static) -> Self {
        Self::new(provider_id, Some(Box::new(chat)), None)
    }

    pub fn embedding_only(provider_id: impl Into<String>, embedding: impl EmbeddingProvider + 'static) -> Self {
        Self::new(provider_id, None, Some(Box::new(embedding)))
    }

    pub fn both(
        provider_id: impl Into<String>,
        chat: impl ChatProvider + 'static,
        embedding: impl EmbeddingProvider + 'static,
    ) -> Self {
        Self::new(provider_id, Some(Box::new(chat)), Some(Box::new(embedding)))
    }
}

#[async_trait]
impl ProviderAdapter for CombinedProviderAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn capabilities(&self) -> &[ProviderCapability] {
        &self.capabilities
    }

    async fn ping(&self) -> AthenaeumResult<PingResponse> {
        Ok(PingResponse {
            provider_id: self.provider_id.clone(),
            capabilities: self.capabilities.clone(),
            latency_ms: 0,
            health: ProviderHealth::Healthy,
            metadata: Default::default(),
        })
    }

    async fn embed(&self, request: EmbedRequest) -> AthenaeumResult<EmbedResponse> {
        let embedding = self
            .embedding
            .as_ref()
            .ok_or(AthenaeumError::Llm(LlmError::ProviderNotConfigured))?;
        let start = Instant::now();
        let vector = embedding.embed(&request.text).await?;
        Ok(EmbedResponse {
            embedding: vector,
            request_id: request.request_id,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn chat(&self, request: ChatCallRequest) -> AthenaeumResult<ChatCallResponse> {
        let chat = self.chat.as_ref().ok_or(AthenaeumError::Llm(LlmError::ProviderNotConfigured))?;
        let start = Instant::now();
        let response = chat.chat(&request.messages, &request.opts).await?;
        Ok(ChatCallResponse {
            response,
            request_id: request.request_id,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

impl std::fmt::Debug for CombinedProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinedProviderAdapter")
            .field("provider_id", &self.provider_id)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athenaeum_core::EmbeddingVector;

    struct StubEmbedding;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        async fn embed(&self, _text: &str) -> AthenaeumResult<EmbeddingVector> {
            Ok(EmbeddingVector::new(vec![0.0, 1.0], "stub".to_string()))
        }
        async fn embed_batch(&self, texts: &[&str]) -> AthenaeumResult<Vec<EmbeddingVector>> {
            Ok(texts.iter().map(|_| EmbeddingVector::new(vec![0.0, 1.0], "stub".to_string())).collect())
        }
        fn dimensions(&self) -> i32 {
            2
        }
        fn model_id(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn embedding_only_has_no_chat_capability() {
        let adapter = CombinedProviderAdapter::embedding_only("stub", StubEmbedding);
        assert_eq!(adapter.capabilities(), &[ProviderCapability::Embedding]);
        let result = adapter
            .chat(ChatCallRequest {
                messages: vec![],
                opts: crate::ChatOptions {
                    model: "stub".to_string(),
                    temperature: None,
                    max_tokens: 1,
                },
                request_id: Uuid::now_v7(),
            })
            .await;
        assert!(result.is_err());
    }
}
