// src/core/health_check.rs

use crate::config::GlobalConfig;
use crate::storage::KeyStore;
use crate::utils::OperationTimer;
use async_trait::async_trait;
use futures_util::future::join_all;
use secrecy::Secret;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Provider name to the key names to probe.
pub type HealthTargets = BTreeMap<String, Vec<String>>;

/// Outcome of checking one key against its provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub valid: bool,
    pub message: String,
}

impl ProbeResult {
    pub fn valid(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// Checks whether a key is currently accepted by its provider.
#[async_trait]
pub trait KeyProbe: Send + Sync {
    async fn probe(&self, provider: &str, key: &Secret<String>) -> ProbeResult;
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyCheck {
    pub provider: String,
    pub key_name: String,
    pub result: ProbeResult,
}

/// Result of one sweep over all targets
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub checks: Vec<KeyCheck>,
}

/// Periodically probes every key and writes the result into the store.
#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn KeyStore>,
    probe: Arc<dyn KeyProbe>,
    check_interval: Duration,
    key_timeout: Duration,
    stop: CancellationToken,
}

impl HealthChecker {
    pub fn new(
        store: Arc<dyn KeyStore>,
        probe: Arc<dyn KeyProbe>,
        check_interval: Duration,
        key_timeout: Duration,
    ) -> Self {
        Self {
            store,
            probe,
            check_interval,
            key_timeout,
            stop: CancellationToken::new(),
        }
    }

    pub fn from_config(global: &GlobalConfig, store: Arc<dyn KeyStore>, probe: Arc<dyn KeyProbe>) -> Self {
        Self::new(
            store,
            probe,
            Duration::from_secs(global.health_check_interval_secs),
            Duration::from_secs(global.key_timeout_secs),
        )
    }

    /// Sweep immediately and then once per interval until stopped or `cancel`
    /// fires. Sweeps run detached; probes still in flight are aborted on exit.
    pub async fn run(&self, cancel: CancellationToken, targets: HealthTargets) {
        let targets = Arc::new(targets);
        let sweeps = CancellationToken::new();
        let _abort_sweeps = sweeps.clone().drop_guard();

        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.check_interval.as_secs(),
            providers = targets.len(),
            "Key health checker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let checker = self.clone();
                    let targets = Arc::clone(&targets);
                    let token = sweeps.clone();
                    tokio::spawn(async move {
                        checker.sweep_once(&targets, &token).await;
                    });
                }
            }
        }

        info!("Key health checker stopped");
    }

    /// Run the checker on its own task.
    pub fn spawn(&self, cancel: CancellationToken, targets: HealthTargets) -> JoinHandle<()> {
        let checker = self.clone();
        tokio::spawn(async move { checker.run(cancel, targets).await })
    }

    /// Ask the loop to exit. A stopped checker does not start again.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Probe every target concurrently. Keys whose probe was cancelled are left
    /// out of the report and keep their previous health.
    pub async fn sweep_once(&self, targets: &HealthTargets, cancel: &CancellationToken) -> SweepReport {
        let timer = OperationTimer::start("health_sweep");

        let checks = targets.iter().flat_map(|(provider, names)| {
            names
                .iter()
                .map(move |name| self.check_key(provider, name, cancel))
        });
        let checks: Vec<KeyCheck> = join_all(checks).await.into_iter().flatten().collect();

        let healthy = checks.iter().filter(|c| c.result.valid).count();
        let report = SweepReport {
            checked: checks.len(),
            healthy,
            unhealthy: checks.len() - healthy,
            checks,
        };

        let elapsed = timer.finish();
        if report.unhealthy > 0 {
            warn!(
                checked = report.checked,
                unhealthy = report.unhealthy,
                elapsed_ms = elapsed.as_millis() as u64,
                "Health sweep found unhealthy keys"
            );
        } else {
            debug!(checked = report.checked, elapsed_ms = elapsed.as_millis() as u64, "Health sweep complete");
        }
        report
    }

    async fn check_key(&self, provider: &str, key_name: &str, cancel: &CancellationToken) -> Option<KeyCheck> {
        if cancel.is_cancelled() {
            return None;
        }

        let result = match self.store.get_key(provider, key_name).await {
            Ok(secret) => {
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    outcome = timeout(self.key_timeout, self.probe.probe(provider, &secret)) => {
                        outcome.unwrap_or_else(|_| {
                            ProbeResult::invalid(format!(
                                "health probe timed out after {}s",
                                self.key_timeout.as_secs()
                            ))
                        })
                    }
                }
            }
            Err(e) => ProbeResult::invalid(e.to_string()),
        };

        if let Err(e) = self.store.set_health(provider, key_name, result.valid).await {
            debug!(provider, key_name, error = %e, "Could not write probe result");
        } else if !result.valid {
            warn!(provider, key_name, reason = %result.message, "Health probe failed");
            if let Err(e) = self.store.record_error(provider, key_name, &result.message).await {
                error!(provider, key_name, error = %e, "Could not record probe failure");
            }
        }

        Some(KeyCheck {
            provider: provider.to_string(),
            key_name: key_name.to_string(),
            result,
        })
    }

    /// Current health flags. Keys the store does not know read as unhealthy.
    pub async fn health_status(&self, targets: &HealthTargets) -> BTreeMap<String, BTreeMap<String, bool>> {
        let mut status = BTreeMap::new();
        for (provider, names) in targets {
            let mut flags = BTreeMap::new();
            for name in names {
                let healthy = self.store.is_healthy(provider, name).await.unwrap_or(false);
                flags.insert(name.clone(), healthy);
            }
            status.insert(provider.clone(), flags);
        }
        status
    }
}
