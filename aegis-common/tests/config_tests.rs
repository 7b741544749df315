//! Tests for bootstrap configuration
//!
//! Uses serial_test: tests that touch AEGIS_* or provider key environment
//! variables are marked #[serial] so they never run in parallel.

use aegis_common::config::{AiProvider, RootFolderInitializer, RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

fn clear_env() {
    for name in [ROOT_FOLDER_ENV, "GROQ_API_KEY", "OPENAI_API_KEY", "AEGIS_MOCK_AI", "AEGIS_WEBHOOK_URL"] {
        env::remove_var(name);
    }
}

#[test]
fn test_parse_full_config() {
    let config = TomlConfig::from_toml_str(
        r#"
        root_folder = "/srv/aegis"
        bind_address = "0.0.0.0:8080"
        log_level = "debug"

        [ai]
        provider = "openai"
        api_key = "sk-test"
        model = "gpt-4o-mini"
        requests_per_second = 2

        [alerts]
        webhook_url = "https://hooks.example.com/abc"
        "#,
    )
    .unwrap();

    assert_eq!(config.root_folder.as_deref(), Some("/srv/aegis"));
    assert_eq!(config.bind_address.as_deref(), Some("0.0.0.0:8080"));
    assert_eq!(config.ai.requests_per_second, Some(2));
    assert_eq!(config.alerts.webhook_url.as_deref(), Some("https://hooks.example.com/abc"));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let result = TomlConfig::from_toml_str("root_folder = [");
    assert!(matches!(result, Err(aegis_common::Error::Config(_))));
}

#[test]
#[serial]
fn test_resolver_priority_cli_over_env() {
    clear_env();
    env::set_var(ROOT_FOLDER_ENV, "/tmp/aegis-from-env");

    let resolver = RootFolderResolver::new("test").with_cli_arg(Some(PathBuf::from("/tmp/aegis-from-cli")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/aegis-from-cli"));

    let resolver = RootFolderResolver::new("test");
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/aegis-from-env"));

    clear_env();
}

#[test]
#[serial]
fn test_resolver_env_over_toml() {
    clear_env();
    let config = TomlConfig::from_toml_str(r#"root_folder = "/tmp/aegis-from-toml""#).unwrap();

    let resolver = RootFolderResolver::new("test").with_toml(&config);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/aegis-from-toml"));

    env::set_var(ROOT_FOLDER_ENV, "/tmp/aegis-from-env");
    let resolver = RootFolderResolver::new("test").with_toml(&config);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/aegis-from-env"));

    clear_env();
}

#[test]
fn test_initializer_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("aegis-root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("feedback.db"));
}

#[test]
#[serial]
fn test_ai_disabled_without_keys() {
    clear_env();
    let settings = TomlConfig::default().ai_settings(false);
    assert_eq!(settings.provider, AiProvider::Disabled);
}

#[test]
#[serial]
fn test_ai_groq_key_detected() {
    clear_env();
    env::set_var("GROQ_API_KEY", "gsk-test");

    let settings = TomlConfig::default().ai_settings(false);
    assert_eq!(settings.provider, AiProvider::Groq);
    assert_eq!(settings.api_key.as_deref(), Some("gsk-test"));
    assert!(settings.base_url.contains("groq"));

    clear_env();
}

#[test]
#[serial]
fn test_ai_mock_flag_wins() {
    clear_env();
    env::set_var("OPENAI_API_KEY", "sk-test");

    let settings = TomlConfig::default().ai_settings(true);
    assert_eq!(settings.provider, AiProvider::Mock);

    clear_env();
}

#[test]
#[serial]
fn test_ai_explicit_provider_without_key_is_disabled() {
    clear_env();
    let config = TomlConfig::from_toml_str("[ai]\nprovider = \"openai\"").unwrap();
    assert_eq!(config.ai_settings(false).provider, AiProvider::Disabled);
}

#[test]
#[serial]
fn test_webhook_env_overrides_file() {
    clear_env();
    let config = TomlConfig::from_toml_str("[alerts]\nwebhook_url = \"https://file.example\"").unwrap();
    assert_eq!(config.webhook_url().as_deref(), Some("https://file.example"));

    env::set_var("AEGIS_WEBHOOK_URL", "https://env.example");
    assert_eq!(config.webhook_url().as_deref(), Some("https://env.example"));

    clear_env();
}
