//! OpenAI chat provider: buffered and streaming, over the Chat Completions API

use super::client::OpenAIClient;
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::{ChatChunk, ChatMessage, ChatOptions, ChatProvider, ChatResponse, ChatStream, Usage};
use async_trait::async_trait;
use athenaeum_core::AthenaeumResult;
use futures_util::StreamExt;
use serde_json::Value;

use super::super::{invalid_response, request_failed};

/// Chat provider over OpenAI's Chat Completions API.
pub struct OpenAIChatProvider {
    client: OpenAIClient,
}

impl OpenAIChatProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: OpenAIClient::new(api_key, 60),
        }
    }

    fn to_wire(messages: &[ChatMessage]) -> Vec<Message> {
        messages
            .iter()
            .map(|m| Message {
                role: match m.role {
                    crate::ChatRole::System => "system".to_string(),
                    crate::ChatRole::User => "user".to_string(),
                    crate::ChatRole::Assistant => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ChatProvider for OpenAIChatProvider {
    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> AthenaeumResult<ChatResponse> {
        let request = CompletionRequest {
            model: opts.model.clone(),
            messages: Self::to_wire(messages),
            max_tokens: Some(opts.max_tokens),
            temperature: opts.temperature,
        };

        let response: CompletionResponse = self.client.request("chat/completions", request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| invalid_response("openai", "no completion in response"))?;

        Ok(ChatResponse {
            content: choice.message.content,
            model: opts.model.clone(),
            usage: Usage {
                prompt_tokens: response.usage.prompt_tokens,
                completion_tokens: response.usage.completion_tokens.unwrap_or(0),
            },
        })
    }

    async fn chat_stream(&self, messages: &[ChatMessage], opts: &ChatOptions) -> AthenaeumResult<ChatStream> {
        #[derive(serde::Serialize)]
        struct StreamingCompletionRequest {
            model: String,
            messages: Vec<Message>,
            #[serde(skip_serializing_if = "Option::is_none")]
            max_tokens: Option<i32>,
            #[serde(skip_serializing_if = "Option::is_none")]
            temperature: Option<f32>,
            stream: bool,
        }

        let body = StreamingCompletionRequest {
            model: opts.model.clone(),
            messages: Self::to_wire(messages),
            max_tokens: Some(opts.max_tokens),
            temperature: opts.temperature,
            stream: true,
        };

        let response = self
            .client
            .raw_post("chat/completions", &body)
            .await
            .map_err(|e| request_failed("openai", 0, format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(request_failed("openai", status, text));
        }

        let byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            futures_util::pin_mut!(byte_stream);
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(request_failed("openai", 0, format!("stream error: {e}")));
                        break;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..pos + 1);

                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        continue;
                    }
                    let parsed: Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if let Some(text) = parsed
                        .get("choices")
                        .and_then(|c| c.get(0))
                        .and_then(|c| c.get("delta"))
                        .and_then(|d| d.get("content"))
                        .and_then(Value::as_str)
                    {
                        yield Ok(ChatChunk { text: text.to_string() });
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for OpenAIChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIChatProvider").finish()
    }
}
