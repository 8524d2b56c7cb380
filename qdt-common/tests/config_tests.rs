//! Integration tests for configuration loading
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate QDT_CONFIG are marked with #[serial].

use qdt_common::config::{load_config, resolve_config_path, PrebuildConfig, CONFIG_ENV_VAR};
use qdt_common::{Error, Language};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const SAMPLE: &str = r#"
domain = "uk"
data_path = "/data/uk"
output_root = "/out"
languages = ["EN", "FR", "PT"]
questions_per_test = 20
compose_mode = "fix_missed"
random_seed = 42

[doctor]
workers = 4
canonical = true

[llm]
model = "gpt-4o-mini"
retry_delay_ms = 10

[logging]
level = "debug"
"#;

#[test]
fn test_parse_full_document() {
    let config = PrebuildConfig::from_toml_str(SAMPLE).unwrap();

    assert_eq!(config.domain, "uk");
    assert_eq!(config.languages, vec![Language::EN, Language::FR, Language::PT]);
    assert_eq!(config.questions_per_test, 20);
    assert_eq!(config.compose_mode, "fix_missed");
    assert_eq!(config.random_seed, Some(42));
    assert_eq!(config.doctor.workers, 4);
    assert!(config.doctor.canonical);
    assert!(!config.doctor.translation);
    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert_eq!(config.llm.max_retries, 3);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.overrides_path(), PathBuf::from("/data/uk/overrides.csv"));
    assert_eq!(config.prebuild_dir(), PathBuf::from("/out/domains/uk/prebuild"));
}

#[test]
fn test_unknown_language_is_config_error() {
    let err = PrebuildConfig::from_toml_str("languages = [\"EN\", \"XX\"]").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    let temp_dir = TempDir::new().unwrap();
    let cli_path = temp_dir.path().join("cli.toml");
    let env_path = temp_dir.path().join("env.toml");
    fs::write(&cli_path, "domain = \"from-cli\"").unwrap();
    fs::write(&env_path, "domain = \"from-env\"").unwrap();

    env::set_var(CONFIG_ENV_VAR, &env_path);
    let config = load_config(Some(&cli_path)).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.domain, "from-cli");
}

#[test]
#[serial]
fn test_env_variable_used_without_cli() {
    let temp_dir = TempDir::new().unwrap();
    let env_path = temp_dir.path().join("env.toml");
    fs::write(&env_path, "domain = \"from-env\"").unwrap();

    env::set_var(CONFIG_ENV_VAR, &env_path);
    let resolved = resolve_config_path(None);
    let config = load_config(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(env_path));
    assert_eq!(config.domain, "from-env");
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let err = load_config(Some(&missing)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
