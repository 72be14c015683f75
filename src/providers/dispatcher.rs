// src/providers/dispatcher.rs

use super::{
    default_options, CompletionResponse, Message, ProviderRegistry, RequestOptions, ResolvedOptions,
    DEFAULT_PROVIDER,
};
use crate::config::AppConfig;
use crate::core::KeyRotator;
use crate::error::{AppError, Result};
use crate::utils::OperationTimer;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Cost per token charged when the model has no configured rates.
pub const FALLBACK_COST_PER_TOKEN: f64 = 0.001;

/// Front end that selects a key, calls the provider and books the outcome.
#[derive(Clone)]
pub struct Dispatcher {
    rotator: KeyRotator,
    registry: ProviderRegistry,
}

impl Dispatcher {
    pub fn new(rotator: KeyRotator, registry: ProviderRegistry) -> Self {
        Self { rotator, registry }
    }

    pub fn rotator(&self) -> &KeyRotator {
        &self.rotator
    }

    /// Send a single user prompt.
    pub async fn invoke(&self, prompt: &str, options: RequestOptions) -> Result<CompletionResponse> {
        self.chat(&[Message::user(prompt)], options).await
    }

    pub async fn chat(&self, messages: &[Message], options: RequestOptions) -> Result<CompletionResponse> {
        self.chat_with_cancel(messages, options, CancellationToken::new()).await
    }

    #[instrument(skip(self, messages, options, cancel), fields(request_id = %Uuid::new_v4(), provider, model))]
    pub async fn chat_with_cancel(
        &self,
        messages: &[Message],
        options: RequestOptions,
        cancel: CancellationToken,
    ) -> Result<CompletionResponse> {
        let config = self.rotator.config();
        let options = merge_options(&config, options)?;
        let span = tracing::Span::current();
        span.record("provider", options.provider.as_str());
        span.record("model", options.model.as_str());

        validate_model(&config, &options)?;

        let provider = self
            .registry
            .get(&options.provider)
            .ok_or_else(|| AppError::UnsupportedProvider {
                provider: options.provider.clone(),
            })?;

        let selection = self.rotator.get_next_key(&options.provider).await?;
        let timer = OperationTimer::start("provider_call").with_warn_threshold(Duration::from_secs(30));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled {
                operation: format!("{} request", options.provider),
            }),
            result = provider.invoke(messages, &options, &selection) => result,
        };
        let elapsed = timer.finish();

        let mut response = match outcome {
            Ok(response) => response,
            Err(e) => {
                if let Err(record_err) = self
                    .rotator
                    .record_error(&selection.provider, &selection.key_name, &e.to_string())
                    .await
                {
                    debug!(error = %record_err, "Could not record provider error");
                }
                warn!(
                    key_name = %selection.key_name,
                    api_key.preview = %selection.key_preview(),
                    error = %e,
                    "Provider call failed"
                );
                return Err(AppError::dispatch(
                    selection.provider.clone(),
                    selection.key_name.clone(),
                    e.to_string(),
                ));
            }
        };

        let cost = match config
            .provider(&options.provider)
            .and_then(|p| p.model_by_name(&options.model))
        {
            Some(model) => model.calculate_cost(response.usage.prompt_tokens, response.usage.completion_tokens),
            None => response.usage.total_tokens as f64 * FALLBACK_COST_PER_TOKEN,
        };
        response.cost = cost;

        // A completed call is returned even when its usage cannot be booked.
        if let Err(e) = self
            .rotator
            .record_usage(&selection.provider, &selection.key_name, response.usage.total_tokens, cost)
            .await
        {
            warn!(key_name = %selection.key_name, error = %e, "Could not record provider usage");
        }
        self.check_cost_alert(&config, &selection.provider, &selection.key_name, selection.cost_limit)
            .await;

        info!(
            key_name = %selection.key_name,
            tokens = response.usage.total_tokens,
            cost,
            elapsed_ms = elapsed.as_millis() as u64,
            "Provider call completed"
        );
        Ok(response)
    }

    async fn check_cost_alert(&self, config: &AppConfig, provider: &str, key_name: &str, cost_limit: f64) {
        if cost_limit <= 0.0 {
            return;
        }
        let Ok(usage) = self.rotator.store().get_usage(provider, key_name).await else {
            return;
        };
        let threshold = config.global.cost_alert_threshold * cost_limit;
        if usage.daily_cost >= threshold {
            warn!(
                provider,
                key_name,
                daily_cost = usage.daily_cost,
                cost_limit,
                "Key is approaching its daily cost limit"
            );
        }
    }
}

/// Fill unset options: request values first, then the model's configuration,
/// then the provider defaults.
pub fn merge_options(config: &AppConfig, options: RequestOptions) -> Result<ResolvedOptions> {
    let provider_name = options
        .provider
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    let provider_config = config
        .provider(&provider_name)
        .ok_or_else(|| AppError::provider_not_found(&provider_name))?;

    let model_config = match options.model.as_deref() {
        Some(model) => provider_config.model_by_name(model),
        None => provider_config.enabled_models().into_iter().next(),
    };

    let defaults = default_options(&provider_name);
    let model = options
        .model
        .or_else(|| model_config.map(|m| m.name.clone()))
        .unwrap_or(defaults.model);
    let max_tokens = options
        .max_tokens
        .filter(|&t| t > 0)
        .or_else(|| model_config.map(|m| m.max_tokens).filter(|&t| t > 0))
        .unwrap_or(defaults.max_tokens);

    Ok(ResolvedOptions {
        provider: provider_name,
        model,
        max_tokens,
        temperature: options.temperature.unwrap_or(defaults.temperature),
        top_p: options.top_p.or(defaults.top_p),
        stop: options.stop,
    })
}

/// The model must be configured and enabled for the provider.
pub fn validate_model(config: &AppConfig, options: &ResolvedOptions) -> Result<()> {
    if options.model.trim().is_empty() {
        return Err(AppError::InvalidModel {
            message: "model name cannot be empty".to_string(),
        });
    }
    let provider = config
        .provider(&options.provider)
        .ok_or_else(|| AppError::provider_not_found(&options.provider))?;
    if provider.model_by_name(&options.model).is_none() {
        return Err(AppError::InvalidModel {
            message: format!("{} is not enabled for provider {}", options.model, options.provider),
        });
    }
    Ok(())
}
