//! OpenAI provider implementation.

pub mod chat;
pub mod client;
pub mod embedding;
pub mod types;

pub use chat::OpenAIChatProvider;
pub use client::OpenAIClient;
pub use embedding::OpenAIEmbeddingProvider;
