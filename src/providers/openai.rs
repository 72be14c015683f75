// src/providers/openai.rs

use super::{decode, read_json, CompletionResponse, LlmProvider, Message, ResolvedOptions, TokenUsage, OPENAI};
use crate::core::Selection;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Chat completions over `/v1/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl OpenAiProvider {
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

    fn request_body(messages: &[Message], options: &ResolvedOptions) -> serde_json::Value {
        let mut body = json!({
            "model": options.model,
            "messages": messages,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        if let Some(top_p) = options.top_p {
            body["top_p"] = json!(top_p);
        }
        if !options.stop.is_empty() {
            body["stop"] = json!(options.stop);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        OPENAI
    }

    async fn invoke(
        &self,
        messages: &[Message],
        options: &ResolvedOptions,
        selection: &Selection,
    ) -> Result<CompletionResponse> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(selection.key.expose_secret())
            .json(&Self::request_body(messages, options))
            .send()
            .await?;
        let raw = read_json(response, "OpenAI").await?;

        let completion: ChatCompletion = decode(&raw)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::response_format("missing choices in response"))?
            .message
            .content
            .ok_or_else(|| AppError::response_format("invalid message format in response"))?;

        Ok(CompletionResponse {
            content,
            model: options.model.clone(),
            usage: TokenUsage {
                prompt_tokens: completion.usage.prompt_tokens,
                completion_tokens: completion.usage.completion_tokens,
                total_tokens: completion.usage.total_tokens,
            },
            provider: OPENAI.to_string(),
            key_name: selection.key_name.clone(),
            cost: 0.0,
            metadata: raw,
        })
    }
}
