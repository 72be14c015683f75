// src/config/validation.rs

use crate::config::{AppConfig, ProviderConfig};
use crate::error::{AppError, Result};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if config.providers.is_empty() {
            return Err(AppError::config_validation(
                "At least one provider must be configured",
                Some("providers"),
            ));
        }

        for (name, provider) in &config.providers {
            if let Err(e) = Self::validate_provider(name, provider) {
                warn!(provider = %name, "Provider validation failed: {}", e);
                return Err(e);
            }
        }
        debug!("Validated {} providers", config.providers.len());

        Self::validate_global(config)?;

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_provider(name: &str, provider: &ProviderConfig) -> Result<()> {
        if provider.api_keys.is_empty() {
            return Err(AppError::config_validation(
                format!("Provider {name} must have at least one API key"),
                Some("api_keys"),
            ));
        }

        let mut key_names = HashSet::new();
        for (i, key) in provider.api_keys.iter().enumerate() {
            if key.name.trim().is_empty() {
                return Err(AppError::config_validation(
                    format!("Provider {name}: API key {i} has empty name"),
                    Some("api_keys.name"),
                ));
            }
            if key.key.trim().is_empty() {
                return Err(AppError::config_validation(
                    format!("Provider {name}: API key {} has empty key", key.name),
                    Some("api_keys.key"),
                ));
            }
            if !key_names.insert(key.name.as_str()) {
                return Err(AppError::config_validation(
                    format!("Provider {name}: duplicate API key name {}", key.name),
                    Some("api_keys.name"),
                ));
            }
            if key.cost_limit < 0.0 {
                return Err(AppError::config_validation(
                    format!("Provider {name}: API key {} has a negative cost limit", key.name),
                    Some("api_keys.cost_limit"),
                ));
            }
        }

        if !provider.api_keys.iter().any(|k| k.enabled) {
            return Err(AppError::config_validation(
                format!("Provider {name} must have at least one enabled API key"),
                Some("api_keys.enabled"),
            ));
        }

        if provider.models.is_empty() {
            return Err(AppError::config_validation(
                format!("Provider {name} must have at least one model"),
                Some("models"),
            ));
        }
        for (i, model) in provider.models.iter().enumerate() {
            if model.name.trim().is_empty() {
                return Err(AppError::config_validation(
                    format!("Provider {name}: model {i} has empty name"),
                    Some("models.name"),
                ));
            }
        }
        if provider.enabled_models().is_empty() {
            return Err(AppError::config_validation(
                format!("Provider {name} must have at least one enabled model"),
                Some("models.enabled"),
            ));
        }

        if let Some(base_url) = &provider.base_url {
            Self::validate_url(base_url, "base_url")?;
        }

        Ok(())
    }

    fn validate_global(config: &AppConfig) -> Result<()> {
        let global = &config.global;
        if global.encrypt_keys
            && global
                .encryption_passphrase
                .as_deref()
                .map_or(true, |p| p.trim().is_empty())
        {
            return Err(AppError::config_validation(
                "Key encryption is enabled but no encryption passphrase is set",
                Some("global.encryption_passphrase"),
            ));
        }

        if global.health_check_interval_secs == 0 {
            return Err(AppError::config_validation(
                "Health check interval cannot be 0",
                Some("global.health_check_interval_secs"),
            ));
        }

        if global.key_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Key timeout cannot be 0",
                Some("global.key_timeout_secs"),
            ));
        }

        if !(0.0..=1.0).contains(&global.cost_alert_threshold) {
            return Err(AppError::config_validation(
                "Cost alert threshold must be between 0 and 1",
                Some("global.cost_alert_threshold"),
            ));
        }

        Ok(())
    }

    fn validate_url(url_str: &str, field_name: &str) -> Result<()> {
        Url::parse(url_str).map_err(|e| {
            AppError::config_validation(
                format!("Invalid URL in {field_name}: {url_str} - {e}"),
                Some(field_name),
            )
        })?;
        Ok(())
    }
}
