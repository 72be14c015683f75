// tests/health_check_tests.rs

use async_trait::async_trait;
use llm_keypool::core::{HealthChecker, HealthTargets, KeyProbe, ProbeResult};
use llm_keypool::storage::{InMemoryStore, KeyStore};
use secrecy::{ExposeSecret, Secret};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Accepts keys starting with "good", counting every call.
struct PrefixProbe {
    calls: AtomicUsize,
}

#[async_trait]
impl KeyProbe for PrefixProbe {
    async fn probe(&self, _provider: &str, key: &Secret<String>) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if key.expose_secret().starts_with("good") {
            ProbeResult::valid("ok")
        } else {
            ProbeResult::invalid("revoked")
        }
    }
}

/// Never answers.
struct HangingProbe;

#[async_trait]
impl KeyProbe for HangingProbe {
    async fn probe(&self, _provider: &str, _key: &Secret<String>) -> ProbeResult {
        std::future::pending::<()>().await;
        ProbeResult::invalid("unreachable")
    }
}

async fn store_with_keys() -> Arc<dyn KeyStore> {
    let store = InMemoryStore::new();
    store.store_key("openai", "good-key", "good-secret").await.unwrap();
    store.store_key("openai", "bad-key", "bad-secret").await.unwrap();
    Arc::new(store)
}

fn targets() -> HealthTargets {
    let mut targets = BTreeMap::new();
    targets.insert(
        "openai".to_string(),
        vec!["good-key".to_string(), "bad-key".to_string()],
    );
    targets
}

#[tokio::test]
async fn test_sweep_writes_probe_results() {
    let store = store_with_keys().await;
    let probe = Arc::new(PrefixProbe {
        calls: AtomicUsize::new(0),
    });
    let checker = HealthChecker::new(
        Arc::clone(&store),
        probe.clone(),
        Duration::from_secs(60),
        Duration::from_secs(1),
    );

    let report = checker.sweep_once(&targets(), &CancellationToken::new()).await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.healthy, 1);
    assert_eq!(report.unhealthy, 1);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    assert!(store.is_healthy("openai", "good-key").await.unwrap());
    assert!(!store.is_healthy("openai", "bad-key").await.unwrap());

    let usage = store.get_usage("openai", "bad-key").await.unwrap();
    assert_eq!(usage.error_count, 1);
    assert_eq!(usage.last_error.as_deref(), Some("revoked"));
}

#[tokio::test]
async fn test_successful_probe_restores_health() {
    let store = store_with_keys().await;
    for _ in 0..6 {
        store.record_error("openai", "good-key", "transient").await.unwrap();
    }
    assert!(!store.is_healthy("openai", "good-key").await.unwrap());

    let checker = HealthChecker::new(
        Arc::clone(&store),
        Arc::new(PrefixProbe {
            calls: AtomicUsize::new(0),
        }),
        Duration::from_secs(60),
        Duration::from_secs(1),
    );
    checker.sweep_once(&targets(), &CancellationToken::new()).await;

    assert!(store.is_healthy("openai", "good-key").await.unwrap());
}

#[tokio::test]
async fn test_unknown_key_counts_as_invalid() {
    let store = store_with_keys().await;
    let checker = HealthChecker::new(
        Arc::clone(&store),
        Arc::new(PrefixProbe {
            calls: AtomicUsize::new(0),
        }),
        Duration::from_secs(60),
        Duration::from_secs(1),
    );

    let mut targets = targets();
    targets.insert("anthropic".to_string(), vec!["ghost".to_string()]);
    let report = checker.sweep_once(&targets, &CancellationToken::new()).await;
    assert_eq!(report.checked, 3);
    assert_eq!(report.unhealthy, 2);

    let status = checker.health_status(&targets).await;
    assert!(!status["anthropic"]["ghost"]);
    assert!(status["openai"]["good-key"]);
}

#[tokio::test]
async fn test_probe_timeout_marks_key_unhealthy() {
    let store = store_with_keys().await;
    let checker = HealthChecker::new(
        Arc::clone(&store),
        Arc::new(HangingProbe),
        Duration::from_secs(60),
        Duration::from_millis(50),
    );

    let report = checker.sweep_once(&targets(), &CancellationToken::new()).await;
    assert_eq!(report.unhealthy, 2);
    assert!(report.checks[0].result.message.contains("timed out"));
    assert!(!store.is_healthy("openai", "good-key").await.unwrap());
}

#[tokio::test]
async fn test_cancelled_sweep_leaves_health_untouched() {
    let store = store_with_keys().await;
    let checker = HealthChecker::new(
        Arc::clone(&store),
        Arc::new(HangingProbe),
        Duration::from_secs(60),
        Duration::from_secs(30),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), checker.sweep_once(&targets(), &cancel))
        .await
        .expect("sweep should abort promptly on cancellation");
    assert_eq!(report.checked, 0);
    assert!(store.is_healthy("openai", "good-key").await.unwrap());
    assert!(store.is_healthy("openai", "bad-key").await.unwrap());
}

#[tokio::test]
async fn test_run_sweeps_immediately_and_stops_on_cancel() {
    let store = store_with_keys().await;
    let probe = Arc::new(PrefixProbe {
        calls: AtomicUsize::new(0),
    });
    let checker = HealthChecker::new(
        Arc::clone(&store),
        probe.clone(),
        Duration::from_secs(3600),
        Duration::from_secs(1),
    );

    let cancel = CancellationToken::new();
    let handle = checker.spawn(cancel.clone(), targets());

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.is_healthy("openai", "bad-key").await.unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first sweep should run immediately");
    assert_eq!(probe.calls.load(Ordering::SeqCst), 2);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("checker should exit after cancellation")
        .unwrap();
}

#[tokio::test]
async fn test_stop_ends_the_loop() {
    let store = store_with_keys().await;
    let checker = HealthChecker::new(
        store,
        Arc::new(PrefixProbe {
            calls: AtomicUsize::new(0),
        }),
        Duration::from_millis(20),
        Duration::from_secs(1),
    );

    let handle = checker.spawn(CancellationToken::new(), targets());
    tokio::time::sleep(Duration::from_millis(50)).await;
    checker.stop();
    assert!(checker.is_stopped());

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("checker should exit after stop")
        .unwrap();
}
