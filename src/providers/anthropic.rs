// src/providers/anthropic.rs

use super::{decode, read_json, CompletionResponse, LlmProvider, Message, ResolvedOptions, TokenUsage, ANTHROPIC};
use crate::core::Selection;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";

/// Messages API over `/v1/messages`
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// System messages go into the top-level `system` field.
    fn request_body(messages: &[Message], options: &ResolvedOptions) -> serde_json::Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        let turns: Vec<&Message> = messages.iter().filter(|m| m.role != "system").collect();

        let mut body = json!({
            "model": options.model,
            "messages": turns,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n"));
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = json!(top_p);
        }
        if !options.stop.is_empty() {
            body["stop_sequences"] = json!(options.stop);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        ANTHROPIC
    }

    async fn invoke(
        &self,
        messages: &[Message],
        options: &ResolvedOptions,
        selection: &Selection,
    ) -> Result<CompletionResponse> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", selection.key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&Self::request_body(messages, options))
            .send()
            .await?;
        let raw = read_json(response, "Anthropic").await?;

        let parsed: MessagesResponse = decode(&raw)?;
        let content = parsed
            .content
            .into_iter()
            .next()
            .ok_or_else(|| AppError::response_format("missing content in response"))?
            .text
            .ok_or_else(|| AppError::response_format("invalid content format in response"))?;

        Ok(CompletionResponse {
            content,
            model: options.model.clone(),
            usage: TokenUsage {
                prompt_tokens: parsed.usage.input_tokens,
                completion_tokens: parsed.usage.output_tokens,
                total_tokens: parsed.usage.input_tokens + parsed.usage.output_tokens,
            },
            provider: ANTHROPIC.to_string(),
            key_name: selection.key_name.clone(),
            cost: 0.0,
            metadata: raw,
        })
    }
}
