// src/core/rotator.rs

use crate::config::{ApiKeyConfig, AppConfig, ProviderConfig, RotationStrategy};
use crate::core::key_rotation::KeySelector;
use crate::error::{AppError, Result};
use crate::monitoring::{self, ProviderStats, RotationStatus};
use crate::storage::{KeyStore, UsageRecord};
use crate::utils::preview_key;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, Secret};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The credential chosen for one request.
#[derive(Debug, Clone)]
pub struct Selection {
    pub provider: String,
    pub key_name: String,
    pub key: Secret<String>,
    pub rate_limit: u32,
    pub cost_limit: f64,
    pub strategy: RotationStrategy,
    pub usage: UsageRecord,
}

impl Selection {
    pub fn key_preview(&self) -> String {
        preview_key(self.key.expose_secret())
    }
}

/// Health-aware key selection over the configured providers.
#[derive(Clone)]
pub struct KeyRotator {
    config: Arc<RwLock<Arc<AppConfig>>>,
    store: Arc<dyn KeyStore>,
    last_selected: Arc<Mutex<HashMap<String, (String, DateTime<Utc>)>>>,
}

impl KeyRotator {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn KeyStore>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            store,
            last_selected: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Snapshot of the configuration currently in effect
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config.read())
    }

    pub fn store(&self) -> Arc<dyn KeyStore> {
        Arc::clone(&self.store)
    }

    #[instrument(level = "debug", skip(self), fields(strategy))]
    pub async fn get_next_key(&self, provider: &str) -> Result<Selection> {
        let config = self.config();
        let provider_config = config
            .provider(provider)
            .ok_or_else(|| AppError::provider_not_found(provider))?;
        let strategy = config.strategy_for(provider_config);
        tracing::Span::current().record("strategy", strategy.as_str());

        let candidates = self.candidates(provider, provider_config, strategy).await?;

        let selector = KeySelector::for_strategy(strategy);
        let index = selector
            .select_available_key(&candidates, provider, self.store())
            .await?;
        let mut chosen = &candidates[index];
        let mut used_strategy = strategy;

        if provider_config.rotation.health_check && !self.healthy(provider, &chosen.name).await? {
            if !provider_config.rotation.fallback_enabled || candidates.len() < 2 {
                warn!(provider, key_name = %chosen.name, "Selected key is unhealthy and no fallback is allowed");
                return Err(AppError::NoHealthyCredential {
                    provider: provider.to_string(),
                    key_name: chosen.name.clone(),
                });
            }
            chosen = self.fallback(provider, &candidates, index).await?;
            used_strategy = RotationStrategy::RoundRobin;
        }

        let key = self.store.get_key(provider, &chosen.name).await?;
        let usage = match self.store.get_usage(provider, &chosen.name).await {
            Ok(usage) => usage,
            Err(AppError::NotFound { .. }) => UsageRecord::default(),
            Err(e) => return Err(e),
        };

        let now = Utc::now();
        self.last_selected
            .lock()
            .insert(provider.to_string(), (chosen.name.clone(), now));

        let selection = Selection {
            provider: provider.to_string(),
            key_name: chosen.name.clone(),
            key,
            rate_limit: chosen.rate_limit,
            cost_limit: chosen.cost_limit,
            strategy: used_strategy,
            usage,
        };

        info!(
            event = "key_selected",
            provider,
            key_name = %selection.key_name,
            api_key.preview = %selection.key_preview(),
            strategy = %used_strategy,
            total_candidates = candidates.len(),
            "API key selected for request"
        );
        if config.global.audit_logging {
            info!(
                target: "audit",
                action = "key_selected",
                provider,
                key_name = %selection.key_name,
                strategy = %used_strategy,
                timestamp = %now.to_rfc3339(),
                "Key selection"
            );
        }

        Ok(selection)
    }

    /// Valid keys of the provider that still have daily budget left.
    async fn candidates(
        &self,
        provider: &str,
        provider_config: &ProviderConfig,
        strategy: RotationStrategy,
    ) -> Result<Vec<ApiKeyConfig>> {
        let valid = provider_config.enabled_keys();
        let valid_count = valid.len();

        let mut candidates = Vec::with_capacity(valid_count);
        for key in valid {
            let daily_cost = self.daily_cost(provider, &key.name).await?;
            if key.is_under_budget(daily_cost) {
                candidates.push(key);
            } else {
                debug!(provider, key_name = %key.name, daily_cost, cost_limit = key.cost_limit, "Key over daily cost limit");
            }
        }

        if candidates.is_empty() {
            if valid_count > 0 && strategy == RotationStrategy::CostOptimized {
                return Err(AppError::AllCredentialsOverBudget {
                    provider: provider.to_string(),
                });
            }
            warn!(provider, "No API keys available for provider");
            return Err(AppError::NoCredentialsAvailable {
                provider: provider.to_string(),
            });
        }
        Ok(candidates)
    }

    /// Round-robin over the healthy candidates other than `excluded`.
    async fn fallback<'a>(
        &self,
        provider: &str,
        candidates: &'a [ApiKeyConfig],
        excluded: usize,
    ) -> Result<&'a ApiKeyConfig> {
        let mut remaining = Vec::with_capacity(candidates.len() - 1);
        for (index, candidate) in candidates.iter().enumerate() {
            if index != excluded && self.healthy(provider, &candidate.name).await? {
                remaining.push(candidate);
            }
        }

        if remaining.is_empty() {
            warn!(provider, "No healthy fallback key available");
            return Err(AppError::NoHealthyCredential {
                provider: provider.to_string(),
                key_name: candidates[excluded].name.clone(),
            });
        }

        let index = self
            .store
            .next_rotation_index(provider, remaining.len())
            .await?;
        let chosen = remaining[index];
        info!(
            provider,
            unhealthy_key = %candidates[excluded].name,
            key_name = %chosen.name,
            "Falling back to a healthy key"
        );
        Ok(chosen)
    }

    async fn healthy(&self, provider: &str, key_name: &str) -> Result<bool> {
        match self.store.is_healthy(provider, key_name).await {
            Ok(healthy) => Ok(healthy),
            Err(AppError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn daily_cost(&self, provider: &str, key_name: &str) -> Result<f64> {
        match self.store.get_usage(provider, key_name).await {
            Ok(usage) => Ok(usage.daily_cost),
            Err(AppError::NotFound { .. }) => Ok(0.0),
            Err(e) => Err(e),
        }
    }

    pub async fn record_usage(&self, provider: &str, key_name: &str, tokens: u64, cost: f64) -> Result<()> {
        self.store.record_usage(provider, key_name, tokens, cost).await
    }

    pub async fn record_error(&self, provider: &str, key_name: &str, message: &str) -> Result<()> {
        self.store.record_error(provider, key_name, message).await
    }

    /// Replace the configuration and bring the store in line with it.
    ///
    /// New keys are stored, keys whose secret changed are re-stored with a fresh
    /// ledger, and keys that disappeared are deleted. Selections already in
    /// flight keep the snapshot they started with.
    #[instrument(skip(self, config))]
    pub async fn reload(&self, config: AppConfig) -> Result<()> {
        let old = self.config();

        for (provider, provider_config) in &config.providers {
            let stored = self.store.list_keys(provider).await?;
            for api_key in &provider_config.api_keys {
                let unchanged = stored.contains(&api_key.name)
                    && self
                        .store
                        .get_key(provider, &api_key.name)
                        .await
                        .map(|secret| secret.expose_secret() == &api_key.key)
                        .unwrap_or(false);
                if !unchanged {
                    self.store.store_key(provider, &api_key.name, &api_key.key).await?;
                }
            }
            for name in stored {
                if provider_config.key_by_name(&name).is_none() {
                    self.store.delete_key(provider, &name).await?;
                }
            }
        }
        for (provider, provider_config) in &old.providers {
            if !config.providers.contains_key(provider) {
                for api_key in &provider_config.api_keys {
                    self.store.delete_key(provider, &api_key.name).await?;
                }
            }
        }

        let providers = config.providers.len();
        *self.config.write() = Arc::new(config);
        info!(providers, "Configuration reloaded");
        Ok(())
    }

    pub async fn get_rotation_status(&self, provider: &str) -> Result<RotationStatus> {
        let config = self.config();
        let provider_config = config
            .provider(provider)
            .ok_or_else(|| AppError::provider_not_found(provider))?;

        let mut keys = self.store.list_keys(provider).await?;
        keys.sort();
        let current_index = self.store.rotation_index(provider).await?;
        let (last_selected, last_selected_at) = match self.last_selected.lock().get(provider) {
            Some((name, at)) => (Some(name.clone()), Some(*at)),
            None => (None, None),
        };

        Ok(RotationStatus {
            provider: provider.to_string(),
            strategy: config.strategy_for(provider_config),
            current_index,
            keys,
            last_selected,
            last_selected_at,
        })
    }

    pub async fn key_statistics(&self, provider: &str) -> Result<BTreeMap<String, UsageRecord>> {
        monitoring::key_statistics(self.store.as_ref(), provider).await
    }

    pub async fn provider_statistics(&self, provider: &str) -> Result<ProviderStats> {
        monitoring::provider_statistics(self.store.as_ref(), provider).await
    }
}
