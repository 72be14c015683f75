// src/storage/traits.rs

use crate::error::Result;
use crate::storage::UsageRecord;
use async_trait::async_trait;
use secrecy::Secret;

/// Keyed storage of provider credentials plus their usage and health ledger.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Insert or replace a key. Usage is zeroed and the key starts healthy.
    async fn store_key(&self, provider: &str, key_name: &str, key: &str) -> Result<()>;

    /// Retrieve the plaintext of a key
    async fn get_key(&self, provider: &str, key_name: &str) -> Result<Secret<String>>;

    /// Remove a key together with its usage and health entries
    async fn delete_key(&self, provider: &str, key_name: &str) -> Result<()>;

    /// Names of all keys stored for a provider
    async fn list_keys(&self, provider: &str) -> Result<Vec<String>>;

    /// Providers with at least one stored key
    async fn list_providers(&self) -> Result<Vec<String>>;

    async fn is_healthy(&self, provider: &str, key_name: &str) -> Result<bool>;

    /// Overwrite the health flag, e.g. with a probe result
    async fn set_health(&self, provider: &str, key_name: &str, healthy: bool) -> Result<()>;

    /// Mark a key healthy again and clear its error counter
    async fn reset_health(&self, provider: &str, key_name: &str) -> Result<()>;

    async fn record_usage(&self, provider: &str, key_name: &str, tokens: u64, cost: f64) -> Result<()>;

    async fn record_error(&self, provider: &str, key_name: &str, message: &str) -> Result<()>;

    /// Copy of the usage record of a key
    async fn get_usage(&self, provider: &str, key_name: &str) -> Result<UsageRecord>;

    /// Round-robin cursor: returns `cursor % count` and advances past it.
    async fn next_rotation_index(&self, provider: &str, count: usize) -> Result<usize>;

    /// Current round-robin cursor, if the provider has rotated at least once
    async fn rotation_index(&self, provider: &str) -> Result<Option<usize>>;
}
