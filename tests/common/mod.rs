//! Common test utilities and fixtures

#![allow(dead_code)]

use llm_keypool::config::{ApiKeyConfig, AppConfig, ModelConfig, ProviderConfig, RotationStrategy};
use llm_keypool::storage::{self, KeyStore};
use llm_keypool::KeyRotator;
use std::sync::Arc;

/// Test configuration builder
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    fn provider(&mut self, provider: &str) -> &mut ProviderConfig {
        self.config.providers.entry(provider.to_string()).or_default()
    }

    pub fn with_key(mut self, provider: &str, key: ApiKeyConfig) -> Self {
        self.provider(provider).api_keys.push(key);
        self
    }

    pub fn with_keys(mut self, provider: &str, names: &[&str]) -> Self {
        for name in names {
            self.provider(provider)
                .api_keys
                .push(ApiKeyConfig::new(*name, format!("secret-{provider}-{name}")));
        }
        self
    }

    pub fn with_model(mut self, provider: &str, name: &str, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.provider(provider).models.push(ModelConfig {
            name: name.to_string(),
            input_cost_per_1k_tokens: input_per_1k,
            output_cost_per_1k_tokens: output_per_1k,
            max_tokens: 512,
            enabled: true,
        });
        self
    }

    pub fn with_strategy(mut self, provider: &str, strategy: RotationStrategy) -> Self {
        self.provider(provider).rotation.strategy = Some(strategy);
        self
    }

    pub fn with_health_check(mut self, provider: &str, fallback_enabled: bool) -> Self {
        let rotation = &mut self.provider(provider).rotation;
        rotation.health_check = true;
        rotation.fallback_enabled = fallback_enabled;
        self
    }

    pub fn with_base_url(mut self, provider: &str, url: impl Into<String>) -> Self {
        self.provider(provider).base_url = Some(url.into());
        self
    }

    pub fn with_encryption(mut self, passphrase: &str) -> Self {
        self.config.global.encrypt_keys = true;
        self.config.global.encryption_passphrase = Some(passphrase.to_string());
        self
    }

    pub fn with_audit_logging(mut self) -> Self {
        self.config.global.audit_logging = true;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A rotator over a freshly loaded in-memory store.
pub async fn rotator_for(config: AppConfig) -> (KeyRotator, Arc<dyn KeyStore>) {
    let store: Arc<dyn KeyStore> = Arc::new(
        storage::store_from_config(&config)
            .await
            .expect("store should load from config"),
    );
    (KeyRotator::new(Arc::new(config), Arc::clone(&store)), store)
}

/// Keys that pass the offline format checks.
pub fn openai_key(fill: char) -> String {
    format!("sk-{}", fill.to_string().repeat(48))
}

pub fn anthropic_key(fill: char) -> String {
    format!("sk-ant-{}", fill.to_string().repeat(93))
}

pub fn gemini_key(fill: char) -> String {
    format!("AIza{}", fill.to_string().repeat(35))
}

pub const MINIMAL_YAML: &str = r#"
providers:
  openai:
    api_keys:
      - name: primary
        key: sk-primary-secret
        rate_limit: 60
        cost_limit: 10.0
      - name: secondary
        key: sk-secondary-secret
    models:
      - name: gpt-4o-mini
        input_cost_per_1k_tokens: 0.00015
        output_cost_per_1k_tokens: 0.0006
        max_tokens: 2000
    rotation:
      strategy: least_used
      health_check: true
      fallback_enabled: true
global:
  audit_logging: true
  health_check_interval_secs: 60
"#;
