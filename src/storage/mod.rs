// src/storage/mod.rs

pub mod memory;
pub mod traits;
pub mod usage;

pub use memory::InMemoryStore;
pub use traits::KeyStore;
pub use usage::{UsageRecord, MAX_ERRORS_BEFORE_UNHEALTHY};

use crate::config::AppConfig;
use crate::error::Result;
use crate::utils::KeySealer;
use std::sync::Arc;
use tracing::info;

/// Build a store from configuration and load every configured key into it.
pub async fn store_from_config(config: &AppConfig) -> Result<InMemoryStore> {
    let store = match config.global.encryption_passphrase.as_deref() {
        Some(passphrase) if config.global.encrypt_keys => {
            InMemoryStore::with_sealer(Arc::new(KeySealer::new(passphrase)))
        }
        _ => InMemoryStore::new(),
    };

    let mut loaded = 0usize;
    for (provider, provider_config) in &config.providers {
        for api_key in &provider_config.api_keys {
            store.store_key(provider, &api_key.name, &api_key.key).await?;
            loaded += 1;
        }
    }
    info!(
        keys = loaded,
        providers = config.providers.len(),
        encrypted = store.is_encrypted(),
        "Key store initialized from configuration"
    );
    Ok(store)
}
