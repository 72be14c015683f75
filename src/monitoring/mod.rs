// src/monitoring/mod.rs

use crate::config::RotationStrategy;
use crate::error::{AppError, Result};
use crate::storage::{KeyStore, UsageRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Usage and health of one key
#[derive(Debug, Clone, Serialize)]
pub struct KeyStats {
    pub name: String,
    pub healthy: bool,
    pub usage: UsageRecord,
}

/// Aggregated view over all keys of a provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub provider: String,
    pub total_keys: usize,
    pub healthy_keys: usize,
    pub unhealthy_keys: usize,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub keys: Vec<KeyStats>,
}

impl ProviderStats {
    pub fn error_rate(&self) -> f64 {
        let attempts = self.total_requests + self.total_errors;
        if attempts == 0 {
            0.0
        } else {
            self.total_errors as f64 / attempts as f64
        }
    }
}

/// Rotation state of a provider, for operators
#[derive(Debug, Clone, Serialize)]
pub struct RotationStatus {
    pub provider: String,
    pub strategy: RotationStrategy,
    pub current_index: Option<usize>,
    pub keys: Vec<String>,
    pub last_selected: Option<String>,
    pub last_selected_at: Option<DateTime<Utc>>,
}

/// Per-key usage of a provider. Keys removed between the listing and the read
/// are skipped.
pub async fn key_statistics(
    store: &dyn KeyStore,
    provider: &str,
) -> Result<BTreeMap<String, UsageRecord>> {
    let mut stats = BTreeMap::new();
    for name in store.list_keys(provider).await? {
        match store.get_usage(provider, &name).await {
            Ok(usage) => {
                stats.insert(name, usage);
            }
            Err(AppError::NotFound { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(stats)
}

pub async fn provider_statistics(store: &dyn KeyStore, provider: &str) -> Result<ProviderStats> {
    let mut names = store.list_keys(provider).await?;
    names.sort();

    let mut stats = ProviderStats {
        provider: provider.to_string(),
        total_keys: 0,
        healthy_keys: 0,
        unhealthy_keys: 0,
        total_cost: 0.0,
        total_tokens: 0,
        total_requests: 0,
        total_errors: 0,
        keys: Vec::with_capacity(names.len()),
    };

    for name in names {
        let (healthy, usage) = match (
            store.is_healthy(provider, &name).await,
            store.get_usage(provider, &name).await,
        ) {
            (Ok(healthy), Ok(usage)) => (healthy, usage),
            (Err(AppError::NotFound { .. }), _) | (_, Err(AppError::NotFound { .. })) => continue,
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };

        stats.total_keys += 1;
        if healthy {
            stats.healthy_keys += 1;
        } else {
            stats.unhealthy_keys += 1;
        }
        stats.total_cost += usage.cost_used;
        stats.total_tokens += usage.tokens_used;
        stats.total_requests += usage.usage_count;
        stats.total_errors += usage.error_count;
        stats.keys.push(KeyStats {
            name,
            healthy,
            usage,
        });
    }

    debug!(
        provider,
        total_keys = stats.total_keys,
        healthy_keys = stats.healthy_keys,
        "Collected provider statistics"
    );
    Ok(stats)
}

/// Statistics for every provider in the store, sorted by provider name.
pub async fn pool_statistics(store: &dyn KeyStore) -> Result<Vec<ProviderStats>> {
    let mut providers = store.list_providers().await?;
    providers.sort();

    let mut all = Vec::with_capacity(providers.len());
    for provider in providers {
        let stats = provider_statistics(store, &provider).await?;
        if stats.total_keys > 0 && stats.healthy_keys == 0 {
            warn!(provider = %stats.provider, "No healthy API keys left for provider");
        }
        all.push(stats);
    }
    Ok(all)
}
