// tests/config_tests.rs

mod common;

use common::{TestConfigBuilder, MINIMAL_YAML};
use llm_keypool::config::{
    api_key_env_var, load_config, parse_config, save_config, ApiKeyConfig, ConfigValidator,
    RotationStrategy, ENCRYPTION_KEY_ENV,
};
use llm_keypool::error::AppError;
use llm_keypool::{AppState, KeyStore};
use secrecy::ExposeSecret;
use serial_test::serial;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn field_of(err: &AppError) -> Option<&str> {
    match err {
        AppError::ConfigValidation { field, .. } => field.as_deref(),
        _ => None,
    }
}

#[test]
#[serial]
fn test_load_minimal_config() {
    let file = write_config(MINIMAL_YAML);
    let config = load_config(file.path()).unwrap();

    let openai = config.provider("openai").unwrap();
    assert_eq!(openai.api_keys.len(), 2);
    assert_eq!(openai.api_keys[0].rate_limit, 60);
    assert!(openai.api_keys[1].enabled);
    assert_eq!(openai.rotation.strategy, Some(RotationStrategy::LeastUsed));
    assert!(openai.rotation.fallback_enabled);
    assert_eq!(config.strategy_for(openai), RotationStrategy::LeastUsed);

    assert!(config.global.audit_logging);
    assert!(!config.global.encrypt_keys);
    assert_eq!(config.global.health_check_interval_secs, 60);
    assert_eq!(config.global.default_rotation_strategy, RotationStrategy::RoundRobin);
}

#[test]
fn test_missing_file_is_reported() {
    let err = load_config(Path::new("/definitely/not/here/keypool.yaml")).unwrap_err();
    assert!(matches!(err, AppError::ConfigNotFound { ref path } if path.contains("keypool.yaml")));
}

#[test]
fn test_parse_error_carries_line() {
    let err = parse_config("providers:\n  openai:\n    api_keys: [unclosed\n").unwrap_err();
    match err {
        AppError::ConfigParse { line, .. } => assert!(line.is_some()),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_unknown_strategy_is_rejected() {
    let yaml = MINIMAL_YAML.replace("least_used", "fastest_first");
    assert!(matches!(parse_config(&yaml), Err(AppError::ConfigParse { .. })));
}

#[test]
fn test_validation_failures() {
    let empty = TestConfigBuilder::new().build();
    assert_eq!(field_of(&ConfigValidator::validate(&empty).unwrap_err()), Some("providers"));

    let no_models = TestConfigBuilder::new().with_keys("openai", &["a"]).build();
    assert_eq!(field_of(&ConfigValidator::validate(&no_models).unwrap_err()), Some("models"));

    let duplicate = TestConfigBuilder::new()
        .with_keys("openai", &["a", "a"])
        .with_model("openai", "gpt-4o-mini", 0.0, 0.0)
        .build();
    assert_eq!(
        field_of(&ConfigValidator::validate(&duplicate).unwrap_err()),
        Some("api_keys.name")
    );

    let all_disabled = TestConfigBuilder::new()
        .with_key("openai", ApiKeyConfig::new("a", "sk-a").disabled())
        .with_model("openai", "gpt-4o-mini", 0.0, 0.0)
        .build();
    assert_eq!(
        field_of(&ConfigValidator::validate(&all_disabled).unwrap_err()),
        Some("api_keys.enabled")
    );

    let empty_secret = TestConfigBuilder::new()
        .with_key("openai", ApiKeyConfig::new("a", "  "))
        .with_model("openai", "gpt-4o-mini", 0.0, 0.0)
        .build();
    assert_eq!(
        field_of(&ConfigValidator::validate(&empty_secret).unwrap_err()),
        Some("api_keys.key")
    );

    let bad_url = TestConfigBuilder::new()
        .with_keys("openai", &["a"])
        .with_model("openai", "gpt-4o-mini", 0.0, 0.0)
        .with_base_url("openai", "not a url")
        .build();
    assert_eq!(field_of(&ConfigValidator::validate(&bad_url).unwrap_err()), Some("base_url"));

    let mut no_passphrase = TestConfigBuilder::new()
        .with_keys("openai", &["a"])
        .with_model("openai", "gpt-4o-mini", 0.0, 0.0)
        .build();
    no_passphrase.global.encrypt_keys = true;
    assert_eq!(
        field_of(&ConfigValidator::validate(&no_passphrase).unwrap_err()),
        Some("global.encryption_passphrase")
    );

    let mut bad_threshold = TestConfigBuilder::new()
        .with_keys("openai", &["a"])
        .with_model("openai", "gpt-4o-mini", 0.0, 0.0)
        .build();
    bad_threshold.global.cost_alert_threshold = 1.5;
    assert_eq!(
        field_of(&ConfigValidator::validate(&bad_threshold).unwrap_err()),
        Some("global.cost_alert_threshold")
    );
}

#[test]
#[serial]
fn test_environment_overrides_secrets() {
    let var = api_key_env_var("openai", "primary");
    assert_eq!(var, "KEYPOOL_OPENAI_API_KEY_PRIMARY");

    std::env::set_var(&var, "sk-from-env");
    std::env::set_var(ENCRYPTION_KEY_ENV, "env-passphrase");
    let file = write_config(MINIMAL_YAML);
    let result = load_config(file.path());
    std::env::remove_var(&var);
    std::env::remove_var(ENCRYPTION_KEY_ENV);

    let config = result.unwrap();
    let openai = config.provider("openai").unwrap();
    assert_eq!(openai.key_by_name("primary").unwrap().key, "sk-from-env");
    assert_eq!(openai.key_by_name("secondary").unwrap().key, "sk-secondary-secret");
    assert_eq!(config.global.encryption_passphrase.as_deref(), Some("env-passphrase"));
}

#[tokio::test]
#[serial]
async fn test_save_config_round_trip_omits_passphrase() {
    let file = write_config(MINIMAL_YAML);
    let mut config = load_config(file.path()).unwrap();
    config.global.encryption_passphrase = Some("do-not-write".to_string());

    let out = NamedTempFile::new().unwrap();
    save_config(&config, out.path()).await.unwrap();

    let written = std::fs::read_to_string(out.path()).unwrap();
    assert!(!written.contains("do-not-write"));

    let reloaded = parse_config(&written).unwrap();
    assert_eq!(reloaded.providers, config.providers);
    assert_eq!(reloaded.global.encryption_passphrase, None);
}

#[tokio::test]
async fn test_state_seals_keys_when_encryption_is_on() {
    let config = TestConfigBuilder::new()
        .with_keys("openai", &["a", "b"])
        .with_model("openai", "gpt-4o-mini", 0.0, 0.0)
        .with_encryption("passphrase")
        .build();
    let state = AppState::new(config).await.unwrap();

    let key = state.store().get_key("openai", "b").await.unwrap();
    assert_eq!(key.expose_secret(), "secret-openai-b");
    assert!(state.start_health_checks(Default::default()).is_none());
}

#[tokio::test]
async fn test_state_reload_rejects_invalid_config() {
    let config = TestConfigBuilder::new()
        .with_keys("openai", &["a"])
        .with_model("openai", "gpt-4o-mini", 0.0, 0.0)
        .build();
    let state = AppState::new(config).await.unwrap();

    let err = state.reload(TestConfigBuilder::new().build()).await.unwrap_err();
    assert!(matches!(err, AppError::ConfigValidation { .. }));
    assert_eq!(state.store().list_keys("openai").await.unwrap(), vec!["a".to_string()]);
}
