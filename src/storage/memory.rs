// src/storage/memory.rs

use crate::error::{AppError, Result};
use crate::storage::{KeyStore, UsageRecord};
use crate::utils::SecretSealer;
use async_trait::async_trait;
use chrono::Utc;
use secrecy::Secret;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace, warn};

type ProviderMap<T> = HashMap<String, HashMap<String, T>>;

/// All mutable state of the store, guarded by a single lock so that related
/// map updates are atomic with respect to each other.
#[derive(Default)]
struct StoreInner {
    keys: ProviderMap<String>,
    usage: ProviderMap<UsageRecord>,
    health: ProviderMap<bool>,
    cursors: HashMap<String, usize>,
}

impl StoreInner {
    fn usage_mut(&mut self, provider: &str, key_name: &str) -> Result<&mut UsageRecord> {
        self.usage
            .get_mut(provider)
            .ok_or_else(|| AppError::provider_not_found(provider))?
            .get_mut(key_name)
            .ok_or_else(|| AppError::key_not_found(provider, key_name))
    }

    fn health_mut(&mut self, provider: &str, key_name: &str) -> Result<&mut bool> {
        self.health
            .get_mut(provider)
            .ok_or_else(|| AppError::provider_not_found(provider))?
            .get_mut(key_name)
            .ok_or_else(|| AppError::key_not_found(provider, key_name))
    }
}

/// In-memory implementation of key storage
pub struct InMemoryStore {
    inner: Arc<RwLock<StoreInner>>,
    sealer: Option<Arc<dyn SecretSealer>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            sealer: None,
        }
    }

    /// A store that seals every secret before keeping it.
    pub fn with_sealer(sealer: Arc<dyn SecretSealer>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            sealer: Some(sealer),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.sealer.is_some()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for InMemoryStore {
    #[instrument(level = "debug", skip(self, key))]
    async fn store_key(&self, provider: &str, key_name: &str, key: &str) -> Result<()> {
        let stored = match &self.sealer {
            Some(sealer) => sealer.seal(key)?,
            None => key.to_string(),
        };

        let mut inner = self.inner.write().await;
        inner
            .keys
            .entry(provider.to_string())
            .or_default()
            .insert(key_name.to_string(), stored);
        inner
            .usage
            .entry(provider.to_string())
            .or_default()
            .insert(key_name.to_string(), UsageRecord::new(Utc::now()));
        inner
            .health
            .entry(provider.to_string())
            .or_default()
            .insert(key_name.to_string(), true);
        debug!(encrypted = self.sealer.is_some(), "Stored API key");
        Ok(())
    }

    async fn get_key(&self, provider: &str, key_name: &str) -> Result<Secret<String>> {
        let stored = {
            let inner = self.inner.read().await;
            inner
                .keys
                .get(provider)
                .ok_or_else(|| AppError::provider_not_found(provider))?
                .get(key_name)
                .ok_or_else(|| AppError::key_not_found(provider, key_name))?
                .clone()
        };

        let plaintext = match &self.sealer {
            Some(sealer) => sealer.unseal(&stored)?,
            None => stored,
        };
        Ok(Secret::new(plaintext))
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_key(&self, provider: &str, key_name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .keys
            .get_mut(provider)
            .and_then(|keys| keys.remove(key_name))
            .is_some();
        if let Some(usage) = inner.usage.get_mut(provider) {
            usage.remove(key_name);
        }
        if let Some(health) = inner.health.get_mut(provider) {
            health.remove(key_name);
        }
        if !removed {
            trace!("Delete requested for a key that is not stored");
        }
        Ok(())
    }

    async fn list_keys(&self, provider: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .keys
            .get(provider)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_providers(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .keys
            .iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(provider, _)| provider.clone())
            .collect())
    }

    async fn is_healthy(&self, provider: &str, key_name: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        inner
            .health
            .get(provider)
            .ok_or_else(|| AppError::provider_not_found(provider))?
            .get(key_name)
            .copied()
            .ok_or_else(|| AppError::key_not_found(provider, key_name))
    }

    async fn set_health(&self, provider: &str, key_name: &str, healthy: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let flag = inner.health_mut(provider, key_name)?;
        if *flag != healthy {
            debug!(provider, key_name, healthy, "Key health changed");
        }
        *flag = healthy;
        Ok(())
    }

    async fn reset_health(&self, provider: &str, key_name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        *inner.health_mut(provider, key_name)? = true;
        let usage = inner.usage_mut(provider, key_name)?;
        usage.error_count = 0;
        usage.last_error = None;
        debug!(provider, key_name, "Key health reset");
        Ok(())
    }

    async fn record_usage(&self, provider: &str, key_name: &str, tokens: u64, cost: f64) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .usage_mut(provider, key_name)?
            .record_usage(tokens, cost, Utc::now());
        Ok(())
    }

    async fn record_error(&self, provider: &str, key_name: &str, message: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let usage = inner.usage_mut(provider, key_name)?;
        let exceeded = usage.record_error(message);
        let error_count = usage.error_count;
        if exceeded {
            let flag = inner.health_mut(provider, key_name)?;
            if *flag {
                warn!(provider, key_name, error_count, "Key marked unhealthy after repeated errors");
            }
            *flag = false;
        }
        Ok(())
    }

    async fn get_usage(&self, provider: &str, key_name: &str) -> Result<UsageRecord> {
        let inner = self.inner.read().await;
        inner
            .usage
            .get(provider)
            .ok_or_else(|| AppError::provider_not_found(provider))?
            .get(key_name)
            .cloned()
            .ok_or_else(|| AppError::key_not_found(provider, key_name))
    }

    async fn next_rotation_index(&self, provider: &str, count: usize) -> Result<usize> {
        if count == 0 {
            return Err(AppError::NoCredentialsAvailable {
                provider: provider.to_string(),
            });
        }
        let mut inner = self.inner.write().await;
        let cursor = inner.cursors.entry(provider.to_string()).or_insert(0);
        let index = *cursor % count;
        *cursor = (index + 1) % count;
        trace!(provider, index, count, "Advanced rotation cursor");
        Ok(index)
    }

    async fn rotation_index(&self, provider: &str) -> Result<Option<usize>> {
        let inner = self.inner.read().await;
        Ok(inner.cursors.get(provider).copied())
    }
}
