// src/config/loader.rs

use crate::config::{AppConfig, ConfigValidator};
use crate::error::{AppError, Result};
use std::path::Path;
use tracing::{debug, info, warn};

pub const ENCRYPTION_KEY_ENV: &str = "KEYPOOL_ENCRYPTION_KEY";
const API_KEY_ENV_PREFIX: &str = "KEYPOOL";

/// Load configuration from a YAML file, apply environment overrides and validate.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    if !config_path.exists() {
        return Err(AppError::ConfigNotFound {
            path: config_path.display().to_string(),
        });
    }
    info!("Loading configuration from file: {}", config_path.display());
    let content = std::fs::read_to_string(config_path)?;
    let mut config = parse_config(&content)?;

    override_with_env(&mut config);

    ConfigValidator::validate(&config)?;

    debug!("Configuration loaded and validated successfully");
    Ok(config)
}

/// Parse YAML text without touching the environment.
pub fn parse_config(content: &str) -> Result<AppConfig> {
    serde_yaml::from_str(content).map_err(|e| AppError::ConfigParse {
        message: format!("Failed to parse config file: {e}"),
        line: e.location().map(|loc| loc.line()),
    })
}

/// Environment variable that overrides the secret of a configured key.
pub fn api_key_env_var(provider: &str, key_name: &str) -> String {
    format!(
        "{API_KEY_ENV_PREFIX}_{}_API_KEY_{}",
        env_segment(provider),
        env_segment(key_name)
    )
}

fn env_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn override_with_env(config: &mut AppConfig) {
    for (provider_name, provider) in config.providers.iter_mut() {
        for key in provider.api_keys.iter_mut() {
            let var = api_key_env_var(provider_name, &key.name);
            match std::env::var(&var) {
                Ok(value) if !value.trim().is_empty() => {
                    info!(provider = %provider_name, key_name = %key.name, env = %var, "Overriding API key from environment variable");
                    key.key = value;
                }
                Ok(_) => warn!(env = %var, "Ignoring empty API key environment variable"),
                Err(_) => {}
            }
        }
    }

    if let Ok(passphrase) = std::env::var(ENCRYPTION_KEY_ENV) {
        info!("Overriding encryption passphrase from environment variable");
        config.global.encryption_passphrase = Some(passphrase);
    }
}

/// Save configuration to file. Secrets are written as configured; the passphrase is not.
pub async fn save_config(config: &AppConfig, config_path: &Path) -> Result<()> {
    let yaml_content = serde_yaml::to_string(config).map_err(|e| AppError::Serialization {
        message: format!("Failed to serialize config: {e}"),
    })?;

    tokio::fs::write(config_path, yaml_content)
        .await
        .map_err(|e| AppError::Io {
            operation: "write_config".to_string(),
            message: format!("Failed to write config file: {e}"),
        })?;

    info!("Configuration saved to: {}", config_path.display());
    Ok(())
}
