//! Integration tests for the configuration the `stevedore` commands consume.
//!
//! Exercises loading real TOML files from disk and deriving the runtime
//! settings and credential store the lifecycle commands are built from.

use std::fs;
use tempfile::TempDir;

use stevedore_compose::{ComposeConfig, CredentialStore, ImageReference};
use stevedore_core::config::StevedoreConfig;

const VALID: &str = r#"
[general]
log_level = "debug"
log_format = "json"

[docker]
socket = "/run/user/1000/docker.sock"
timeout_secs = 30

[project]
name = "shop"
stop_timeout_secs = 5
log_tail_lines = 100

[services.db]
image = "postgres:16"

[services.web]
image = "nginx"
links = ["db:database"]
"#;

#[tokio::test]
async fn test_config_validate_valid_toml() {
    // Given: A valid config file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("stevedore.toml");
    fs::write(&config_path, VALID).expect("should write config");

    // When: Loading the config
    let config = StevedoreConfig::load(&config_path)
        .await
        .expect("valid config should load successfully");

    // Then: Sections are populated
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.project.name, "shop");
    assert_eq!(config.services.len(), 2);
}

#[tokio::test]
async fn test_config_validate_malformed_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("bad.toml");

    fs::write(&config_path, "[project\nname = \"shop\"\n").expect("should write bad config");

    let result = StevedoreConfig::load(&config_path).await;
    assert!(result.is_err(), "malformed TOML should fail to load");
}

#[tokio::test]
async fn test_config_validate_service_without_image() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("stevedore.toml");

    fs::write(&config_path, "[services.web]\ntty = true\n").expect("should write config");

    let err = StevedoreConfig::load(&config_path).await.unwrap_err();
    assert!(
        err.to_string().contains("services.web.image"),
        "error should name the offending field: {err}"
    );
}

#[tokio::test]
async fn test_config_load_missing_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = StevedoreConfig::load(temp_dir.path().join("absent.toml")).await;
    assert!(result.is_err(), "missing file should fail to load");
}

#[tokio::test]
#[serial_test::serial]
async fn test_compose_config_derived_from_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("stevedore.toml");
    fs::write(&config_path, VALID).expect("should write config");

    let config = StevedoreConfig::load(&config_path).await.expect("should load");
    let compose = ComposeConfig::from_core(&config);

    assert_eq!(compose.project_name, "shop");
    assert_eq!(compose.docker_socket, "/run/user/1000/docker.sock");
    assert_eq!(compose.docker_timeout_secs, 30);
    assert_eq!(compose.stop_timeout_secs, 5);
    assert_eq!(compose.log_tail_lines, 100);
    compose.validate().expect("derived config should validate");
}

#[tokio::test]
#[serial_test::serial]
async fn test_env_override_reaches_compose_config() {
    // Given: A config file and an environment override for the stop timeout
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("stevedore.toml");
    fs::write(&config_path, VALID).expect("should write config");

    let original = std::env::var("STEVEDORE_PROJECT_STOP_TIMEOUT_SECS").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("STEVEDORE_PROJECT_STOP_TIMEOUT_SECS", "42");
    }

    // When: Loading the config the way the lifecycle commands do
    let loaded = StevedoreConfig::load(&config_path).await;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("STEVEDORE_PROJECT_STOP_TIMEOUT_SECS", val),
            None => std::env::remove_var("STEVEDORE_PROJECT_STOP_TIMEOUT_SECS"),
        }
    }

    // Then: The override wins over the file value
    let compose = ComposeConfig::from_core(&loaded.expect("should load"));
    assert_eq!(compose.stop_timeout_secs, 42);
    assert_eq!(compose.stop_timeout(), std::time::Duration::from_secs(42));
}

#[tokio::test]
async fn test_credentials_file_resolves_registry() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("config.json");
    // "ci:s3cret"
    fs::write(
        &path,
        r#"{"auths":{"https://ghcr.io":{"auth":"Y2k6czNjcmV0"}}}"#,
    )
    .expect("should write credentials");

    let store = CredentialStore::load(&path).await.expect("should load");
    let image = ImageReference::parse("ghcr.io/acme/wireguard:1.0").expect("valid reference");
    let credential = store.resolve(&image).expect("ghcr.io credential");

    assert_eq!(credential.username, "ci");
    assert_eq!(credential.password, "s3cret");
}

#[tokio::test]
async fn test_missing_credentials_file_is_empty_store() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = CredentialStore::load(temp_dir.path().join("config.json"))
        .await
        .expect("missing file is not an error");
    assert!(store.is_empty());
}
