//! Anthropic (Claude) provider implementation.

pub mod chat;
pub mod client;
pub mod types;

pub use chat::AnthropicChatProvider;
pub use client::AnthropicClient;
