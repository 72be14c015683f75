// src/state.rs

use crate::config::{AppConfig, ConfigValidator};
use crate::core::{HealthChecker, KeyRotator};
use crate::error::Result;
use crate::providers::{build_http_client, Dispatcher, ProviderRegistry};
use crate::storage::{self, KeyStore};
use crate::validator::KeyValidator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Upper bound for a single provider call.
const PROVIDER_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything a running pool needs, wired together from one configuration.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn KeyStore>,
    rotator: KeyRotator,
    dispatcher: Dispatcher,
    validator: Arc<KeyValidator>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Creating shared AppState: loading keys and HTTP clients...");
        let store: Arc<dyn KeyStore> = Arc::new(storage::store_from_config(&config).await?);

        let http_client = build_http_client(PROVIDER_REQUEST_TIMEOUT)?;
        let probe_client = build_http_client(Duration::from_secs(config.global.key_timeout_secs))?;

        let registry = ProviderRegistry::from_config(&config, http_client);
        let validator = Arc::new(KeyValidator::from_config(&config, probe_client));
        let rotator = KeyRotator::new(Arc::new(config), Arc::clone(&store));
        let dispatcher = Dispatcher::new(rotator.clone(), registry);

        info!("Application state initialized successfully.");
        Ok(Self {
            store,
            rotator,
            dispatcher,
            validator,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.rotator.config()
    }

    pub fn store(&self) -> Arc<dyn KeyStore> {
        Arc::clone(&self.store)
    }

    pub fn rotator(&self) -> &KeyRotator {
        &self.rotator
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn validator(&self) -> Arc<KeyValidator> {
        Arc::clone(&self.validator)
    }

    /// A checker that probes with the live validator.
    pub fn health_checker(&self) -> HealthChecker {
        HealthChecker::from_config(&self.config().global, self.store(), self.validator())
    }

    /// Start background probing when `global.key_validation` is on.
    pub fn start_health_checks(&self, cancel: CancellationToken) -> Option<(HealthChecker, JoinHandle<()>)> {
        let config = self.config();
        if !config.global.key_validation {
            info!("Key validation disabled; background health checks not started");
            return None;
        }
        let checker = self.health_checker();
        let handle = checker.spawn(cancel, config.key_names_by_provider());
        Some((checker, handle))
    }

    /// Validate and apply a new configuration.
    pub async fn reload(&self, config: AppConfig) -> Result<()> {
        ConfigValidator::validate(&config)?;
        self.rotator.reload(config).await
    }
}
