//! Concrete LLM provider implementations.
//!
//! This module contains concrete implementations of the [`crate::EmbeddingProvider`]
//! and [`crate::ChatProvider`] traits for various LLM services.

pub mod adapter;
pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use adapter::CombinedProviderAdapter;
pub use anthropic::{AnthropicChatProvider, AnthropicClient};
pub use ollama::OllamaEmbeddingProvider;
pub use openai::{OpenAIChatProvider, OpenAIClient, OpenAIEmbeddingProvider};

use athenaeum_core::{AthenaeumError, LlmError};

/// Builds a [`LlmError::RequestFailed`] wrapped in [`AthenaeumError`] for a
/// non-2xx HTTP response from `provider`.
pub(crate) fn request_failed(provider: &str, status: u16, message: impl Into<String>) -> AthenaeumError {
    AthenaeumError::Llm(LlmError::RequestFailed {
        provider: provider.to_string(),
        status: status as i32,
        message: message.into(),
    })
}

/// Builds a [`LlmError::InvalidResponse`] wrapped in [`AthenaeumError`] for a
/// 2xx response from `provider` that doesn't parse the way we expect.
pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> AthenaeumError {
    AthenaeumError::Llm(LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}
