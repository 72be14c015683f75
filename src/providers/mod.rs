// src/providers/mod.rs

//! Provider adapters and the dispatcher that routes requests through the pool.

pub mod anthropic;
pub mod dispatcher;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use dispatcher::Dispatcher;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use crate::config::AppConfig;
use crate::core::Selection;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const OPENAI: &str = "openai";
pub const ANTHROPIC: &str = "anthropic";
pub const GEMINI: &str = "gemini";

/// Provider used when a request does not name one.
pub const DEFAULT_PROVIDER: &str = OPENAI;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

/// Caller-supplied request options. Unset values are filled from the model
/// configuration and then from provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl RequestOptions {
    pub fn for_provider(provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Options after merging, as sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOptions {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub stop: Vec<String>,
}

/// Built-in defaults per provider. Unknown providers get the OpenAI defaults
/// with their own name.
pub fn default_options(provider: &str) -> ResolvedOptions {
    let (model, max_tokens) = match provider {
        ANTHROPIC => ("claude-3-sonnet-20240229", 4000),
        GEMINI => ("gemini-2.0-flash", 2000),
        _ => ("gpt-3.5-turbo", 2000),
    };
    ResolvedOptions {
        provider: provider.to_string(),
        model: model.to_string(),
        max_tokens,
        temperature: 0.7,
        top_p: None,
        stop: Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub provider: String,
    pub key_name: String,
    /// Cost charged to the key for this call
    pub cost: f64,
    /// Raw provider payload
    pub metadata: serde_json::Value,
}

/// One upstream LLM API.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        messages: &[Message],
        options: &ResolvedOptions,
        selection: &Selection,
    ) -> Result<CompletionResponse>;
}

/// Provider implementations keyed by provider identifier
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in adapters, honoring per-provider base URL overrides.
    pub fn from_config(config: &AppConfig, client: Client) -> Self {
        let mut registry = Self::new();
        let base_url = |name: &str| config.provider(name).and_then(|p| p.base_url.clone());

        let mut openai = OpenAiProvider::new(client.clone());
        if let Some(url) = base_url(OPENAI) {
            openai = openai.with_base_url(url);
        }
        registry.register(openai);

        let mut anthropic = AnthropicProvider::new(client.clone());
        if let Some(url) = base_url(ANTHROPIC) {
            anthropic = anthropic.with_base_url(url);
        }
        registry.register(anthropic);

        let mut gemini = GeminiProvider::new(client);
        if let Some(url) = base_url(GEMINI) {
            gemini = gemini.with_base_url(url);
        }
        registry.register(gemini);

        for name in config.providers.keys() {
            if !registry.contains(name) {
                warn!(provider = %name, "Configured provider has no adapter; requests to it will fail");
            }
        }
        registry
    }

    pub fn register(&mut self, provider: impl LlmProvider + 'static) {
        self.register_arc(Arc::new(provider));
    }

    pub fn register_arc(&mut self, provider: Arc<dyn LlmProvider>) {
        debug!(provider = provider.name(), "Registered provider adapter");
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

/// Shared HTTP client for provider calls and probes.
pub fn build_http_client(request_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .build()
        .map_err(|e| AppError::HttpClient {
            message: format!("failed to build HTTP client: {e}"),
            status_code: None,
        })
}

/// Turn a non-200 response into an error and parse the body otherwise.
pub(crate) async fn read_json(response: Response, provider_label: &str) -> Result<serde_json::Value> {
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::HttpClient {
            message: format!("{provider_label} API error: {}: {}", status.as_u16(), body.trim()),
            status_code: Some(status.as_u16()),
        });
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| AppError::response_format(e.to_string()))
}

/// Decode a raw payload into a typed view of it.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(raw: &serde_json::Value) -> Result<T> {
    serde_json::from_value(raw.clone()).map_err(|e| AppError::response_format(e.to_string()))
}
