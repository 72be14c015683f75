// src/lib.rs

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod monitoring;
pub mod providers;
pub mod state;
pub mod storage;
pub mod utils;
pub mod validator;

use std::path::Path;
use tracing::{error, info};

pub use config::AppConfig;
pub use crate::core::{HealthChecker, KeyRotator, Selection};
pub use error::{AppError, Result};
pub use providers::{CompletionResponse, Dispatcher, Message, RequestOptions};
pub use state::AppState;
pub use storage::{InMemoryStore, KeyStore, UsageRecord};
pub use validator::KeyValidator;

/// Load and validate the configuration, then build the shared state from it.
pub async fn run(config_path: &Path) -> Result<AppState> {
    info!("Starting LLM key pool...");
    let app_config = setup_configuration(config_path)?;

    AppState::new(app_config).await.map_err(|e| {
        error!(error = ?e, "Failed to initialize application state. Exiting.");
        e
    })
}

/// Loads, validates and logs the application configuration.
pub fn setup_configuration(config_path: &Path) -> Result<AppConfig> {
    let config_path_display = config_path.display().to_string();
    info!(config.path = %config_path_display, "Using configuration file");

    let app_config = config::load_config(config_path).map_err(|e| {
        error!(
            config.path = %config_path_display,
            error = ?e,
            "Failed to load or validate configuration. Exiting."
        );
        e
    })?;

    let total_keys: usize = app_config.providers.values().map(|p| p.api_keys.len()).sum();
    let provider_names: Vec<&str> = app_config.providers.keys().map(String::as_str).collect();
    info!(
        config.providers.count = app_config.providers.len(),
        config.providers.names = ?provider_names,
        config.total_keys = total_keys,
        config.encrypt_keys = app_config.global.encrypt_keys,
        "Configuration loaded and validated successfully."
    );

    Ok(app_config)
}
