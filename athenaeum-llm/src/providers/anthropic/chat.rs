//! Anthropic (Claude) chat provider: buffered and streaming

use super::client::AnthropicClient;
use super::types::{ContentBlock, Message, MessageRequest, MessageResponse};
use crate::{ChatChunk, ChatMessage, ChatOptions, ChatProvider, ChatResponse, ChatStream, Usage};
use async_trait::async_trait;
use athenaeum_core::AthenaeumResult;
use futures_util::StreamExt;
use serde_json::Value;

use super::super::request_failed;

/// Chat provider over Claude's Messages API.
pub struct AnthropicChatProvider {
    client: AnthropicClient,
}

impl AnthropicChatProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: AnthropicClient::new(api_key, 50),
        }
    }

    fn to_wire(messages: &[ChatMessage]) -> (Option<String>, Vec<Message>) {
        let mut system = None;
        let mut wire = Vec::with_capacity(messages.len());
        for m in messages {
            match m.role {
                crate::ChatRole::System => system = Some(m.content.clone()),
                crate::ChatRole::User => wire.push(Message {
                    role: "user".to_string(),
                    content: m.content.clone(),
                }),
                crate::ChatRole::Assistant => wire.push(Message {
                    role: "assistant".to_string(),
                    content: m.content.clone(),
                }),
            }
        }
        (system, wire)
    }

    fn extract_text(content: Vec<ContentBlock>) -> String {
        content
            .into_iter()
            .map(|ContentBlock::Text { text }| text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ChatProvider for AnthropicChatProvider {
    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> AthenaeumResult<ChatResponse> {
        let (system, wire) = Self::to_wire(messages);
        let request = MessageRequest {
            model: opts.model.clone(),
            system,
            messages: wire,
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
        };

        let response: MessageResponse = self.client.request("messages", request).await?;

        Ok(ChatResponse {
            content: Self::extract_text(response.content),
            model: response.model,
            usage: Usage {
                prompt_tokens: response.usage.input_tokens,
                completion_tokens: response.usage.output_tokens,
            },
        })
    }

    async fn chat_stream(&self, messages: &[ChatMessage], opts: &ChatOptions) -> AthenaeumResult<ChatStream> {
        let (system, wire) = Self::to_wire(messages);

        #[derive(serde::Serialize)]
        struct StreamingMessageRequest {
            model: String,
            messages: Vec<Message>,
            max_tokens: i32,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            temperature: Option<f32>,
            stream: bool,
        }

        let body = StreamingMessageRequest {
            model: opts.model.clone(),
            messages: wire,
            max_tokens: opts.max_tokens,
            system,
            temperature: opts.temperature,
            stream: true,
        };

        let response = self
            .client
            .raw_post("messages", &body)
            .await
            .map_err(|e| request_failed("anthropic", 0, format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(request_failed("anthropic", status, text));
        }

        let byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            futures_util::pin_mut!(byte_stream);
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(request_failed("anthropic", 0, format!("stream error: {e}")));
                        break;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find("\n\n") {
                    let event = buf[..pos].to_string();
                    buf.drain(..pos + 2);

                    for line in event.lines() {
                        let Some(data) = line.strip_prefix("data: ") else { continue };
                        let parsed: Value = match serde_json::from_str(data) {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        if parsed.get("type").and_then(Value::as_str) == Some("content_block_delta") {
                            if let Some(text) = parsed
                                .get("delta")
                                .and_then(|d| d.get("text"))
                                .and_then(Value::as_str)
                            {
                                yield Ok(ChatChunk { text: text.to_string() });
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for AnthropicChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicChatProvider").finish()
    }
}
