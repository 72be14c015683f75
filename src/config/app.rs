// src/config/app.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the next key of a provider is chosen.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    LeastUsed,
    CostOptimized,
    Random,
    Single,
}

impl RotationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastUsed => "least_used",
            Self::CostOptimized => "cost_optimized",
            Self::Random => "random",
            Self::Single => "single",
        }
    }
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single credential as configured.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ApiKeyConfig {
    pub name: String,
    #[serde(default)]
    pub key: String,
    /// Requests per minute. Informational; passed through in selections.
    #[serde(default)]
    pub rate_limit: u32,
    /// Daily cost limit. Zero or negative means unlimited.
    #[serde(default)]
    pub cost_limit: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ApiKeyConfig {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            rate_limit: 0,
            cost_limit: 0.0,
            enabled: true,
        }
    }

    pub fn with_cost_limit(mut self, cost_limit: f64) -> Self {
        self.cost_limit = cost_limit;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enabled and fully specified.
    pub fn is_valid(&self) -> bool {
        self.enabled && !self.key.trim().is_empty() && !self.name.trim().is_empty()
    }

    pub fn has_cost_limit(&self) -> bool {
        self.cost_limit > 0.0
    }

    /// Whether `daily_cost` still leaves room under this key's limit.
    pub fn is_under_budget(&self, daily_cost: f64) -> bool {
        !self.has_cost_limit() || daily_cost < self.cost_limit
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub input_cost_per_1k_tokens: f64,
    #[serde(default)]
    pub output_cost_per_1k_tokens: f64,
    #[serde(default)]
    pub max_tokens: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ModelConfig {
    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input = input_tokens as f64 / 1000.0 * self.input_cost_per_1k_tokens;
        let output = output_tokens as f64 / 1000.0 * self.output_cost_per_1k_tokens;
        input + output
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct RotationConfig {
    /// Falls back to `global.default_rotation_strategy` when absent.
    #[serde(default)]
    pub strategy: Option<RotationStrategy>,
    #[serde(default)]
    pub health_check: bool,
    #[serde(default)]
    pub fallback_enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub rotation: RotationConfig,
    /// Overrides the provider's public API endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Keys that are enabled and fully specified, in configured order.
    pub fn enabled_keys(&self) -> Vec<ApiKeyConfig> {
        self.api_keys.iter().filter(|k| k.is_valid()).cloned().collect()
    }

    pub fn enabled_models(&self) -> Vec<&ModelConfig> {
        self.models.iter().filter(|m| m.enabled).collect()
    }

    pub fn model_by_name(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.enabled && m.name == name)
    }

    pub fn key_by_name(&self, name: &str) -> Option<&ApiKeyConfig> {
        self.api_keys.iter().find(|k| k.name == name)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GlobalConfig {
    #[serde(default)]
    pub encrypt_keys: bool,
    #[serde(default, skip_serializing)]
    pub encryption_passphrase: Option<String>,
    /// Run the background health checker.
    #[serde(default)]
    pub key_validation: bool,
    #[serde(default)]
    pub audit_logging: bool,
    #[serde(default)]
    pub default_rotation_strategy: RotationStrategy,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_key_timeout")]
    pub key_timeout_secs: u64,
    /// Fraction of a key's daily limit at which a cost warning is logged.
    #[serde(default = "default_cost_alert_threshold")]
    pub cost_alert_threshold: f64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            encrypt_keys: false,
            encryption_passphrase: None,
            key_validation: false,
            audit_logging: false,
            default_rotation_strategy: RotationStrategy::default(),
            health_check_interval_secs: default_health_check_interval(),
            key_timeout_secs: default_key_timeout(),
            cost_alert_threshold: default_cost_alert_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub global: GlobalConfig,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_health_check_interval() -> u64 {
    300
}

fn default_key_timeout() -> u64 {
    30
}

fn default_cost_alert_threshold() -> f64 {
    0.8
}

impl AppConfig {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Strategy in effect for a provider after applying the global default.
    pub fn strategy_for(&self, provider: &ProviderConfig) -> RotationStrategy {
        provider
            .rotation
            .strategy
            .unwrap_or(self.global.default_rotation_strategy)
    }

    /// Provider name to key names, the shape the health checker sweeps over.
    pub fn key_names_by_provider(&self) -> BTreeMap<String, Vec<String>> {
        self.providers
            .iter()
            .map(|(name, provider)| {
                let keys = provider.api_keys.iter().map(|k| k.name.clone()).collect();
                (name.clone(), keys)
            })
            .collect()
    }
}
