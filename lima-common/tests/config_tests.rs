//! Integration tests for configuration resolution and graceful degradation
//!
//! Tests cover:
//! - Missing config files fall back to compiled defaults
//! - Priority order: CLI path > LIMA_CONFIG > platform default
//! - Environment overrides applied after the file
//!
//! Note: Uses serial_test to prevent environment variable races. Tests that
//! touch LIMA_* variables are marked #[serial].

use lima_common::config::{resolve_config_path, DashboardConfig, CONFIG_ENV_VAR};
use lima_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

fn clear_env() {
    for var in [
        CONFIG_ENV_VAR,
        "LIMA_BIND_ADDR",
        "LIMA_LOG_LEVEL",
        "LIMA_NOTIFICATION_DURATION_MS",
        "LIMA_PROFILE_TIMEOUT_MS",
        "LIMA_SEED_FILE",
    ] {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    clear_env();
    let missing = PathBuf::from("/nonexistent/lima/config.toml");
    let config = DashboardConfig::load(Some(&missing)).expect("missing file is not fatal");
    assert_eq!(config, DashboardConfig::default());
}

#[test]
#[serial]
fn test_file_values_are_loaded() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "bind_addr = \"0.0.0.0:9000\"").unwrap();
    writeln!(file, "fallback_id_len = 4").unwrap();
    writeln!(file, "seed_file = \"/srv/lima/seed.json\"").unwrap();

    let config = DashboardConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.bind_addr, "0.0.0.0:9000");
    assert_eq!(config.fallback_id_len, 4);
    assert_eq!(config.seed_file, Some(PathBuf::from("/srv/lima/seed.json")));
    assert_eq!(config.notification_duration_ms, 5000);
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "bind_addr = [1, 2").unwrap();

    let err = DashboardConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_env_var_selects_config_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "log_level = \"debug\"").unwrap();
    env::set_var(CONFIG_ENV_VAR, file.path());

    assert_eq!(resolve_config_path(None), Some(file.path().to_path_buf()));
    let config = DashboardConfig::load(None).unwrap();
    assert_eq!(config.log_level, "debug");

    clear_env();
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");
    let cli = PathBuf::from("/from/cli.toml");
    assert_eq!(resolve_config_path(Some(&cli)), Some(cli));
    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_apply_after_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "notification_duration_ms = 8000").unwrap();
    env::set_var("LIMA_NOTIFICATION_DURATION_MS", "2500");
    env::set_var("LIMA_BIND_ADDR", "127.0.0.1:6000");

    let config = DashboardConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.notification_duration_ms, 2500);
    assert_eq!(config.bind_addr, "127.0.0.1:6000");

    clear_env();
}

#[test]
#[serial]
fn test_bad_env_override_is_rejected() {
    clear_env();
    env::set_var("LIMA_NOTIFICATION_DURATION_MS", "five seconds");
    let missing = PathBuf::from("/nonexistent/lima/config.toml");
    let err = DashboardConfig::load(Some(&missing)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    clear_env();
}
