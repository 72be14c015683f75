// src/config/mod.rs

pub mod app;
pub mod loader;
pub mod validation;

pub use app::{
    ApiKeyConfig, AppConfig, GlobalConfig, ModelConfig, ProviderConfig, RotationConfig,
    RotationStrategy,
};
pub use loader::{api_key_env_var, load_config, parse_config, save_config, ENCRYPTION_KEY_ENV};
pub use validation::ConfigValidator;
