// src/providers/gemini.rs

use super::{decode, read_json, CompletionResponse, LlmProvider, Message, ResolvedOptions, TokenUsage, GEMINI};
use crate::core::Selection;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
/// Keeps the key out of the request URL.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// `generateContent` over `/v1/models/{model}`
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: UsageMetadata,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

impl GeminiProvider {
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

    /// The conversation is flattened into one text part, `assistant` becoming `model`.
    fn request_body(messages: &[Message], options: &ResolvedOptions) -> serde_json::Value {
        let transcript: String = messages
            .iter()
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { m.role.as_str() };
                format!("{role}: {}\n", m.content)
            })
            .collect();

        let mut generation_config = json!({
            "temperature": options.temperature,
            "maxOutputTokens": options.max_tokens,
        });
        if let Some(top_p) = options.top_p {
            generation_config["topP"] = json!(top_p);
        }
        if !options.stop.is_empty() {
            generation_config["stopSequences"] = json!(options.stop);
        }

        json!({
            "contents": [{ "parts": [{ "text": transcript }] }],
            "generationConfig": generation_config,
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        GEMINI
    }

    async fn invoke(
        &self,
        messages: &[Message],
        options: &ResolvedOptions,
        selection: &Selection,
    ) -> Result<CompletionResponse> {
        let method = format!("{}:generateContent", options.model);
        let mut url = url::Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| AppError::HttpClient {
                message: format!("base URL cannot carry a path: {}", self.base_url),
                status_code: None,
            })?
            .pop_if_empty()
            .extend(["v1", "models", method.as_str()]);

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, selection.key.expose_secret())
            .json(&Self::request_body(messages, options))
            .send()
            .await?;
        let raw = read_json(response, "Gemini").await?;

        let parsed: GenerateContentResponse = decode(&raw)?;
        let content = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AppError::response_format("missing candidates in response"))?
            .content
            .ok_or_else(|| AppError::response_format("invalid content format in response"))?
            .parts
            .into_iter()
            .next()
            .ok_or_else(|| AppError::response_format("missing parts in response"))?
            .text
            .ok_or_else(|| AppError::response_format("invalid text format in response"))?;

        Ok(CompletionResponse {
            content,
            model: options.model.clone(),
            usage: TokenUsage {
                prompt_tokens: parsed.usage_metadata.prompt_token_count,
                completion_tokens: parsed.usage_metadata.candidates_token_count,
                total_tokens: parsed.usage_metadata.total_token_count,
            },
            provider: GEMINI.to_string(),
            key_name: selection.key_name.clone(),
            cost: 0.0,
            metadata: raw,
        })
    }
}
