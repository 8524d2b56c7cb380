//! Configuration loading and directory resolution
//!
//! The prebuild tool is configured by a single TOML file. The file location is
//! resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `QDT_CONFIG` environment variable
//! 3. `./qdt-prebuild.toml` in the working directory
//! 4. Built-in defaults (no file)
//!
//! Every key is optional; missing keys take the built-in default.

use crate::language::Language;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "QDT_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "qdt-prebuild.toml";

/// Top-level prebuild configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrebuildConfig {
    /// Dataset domain name, selects `<output_root>/domains/<domain>`
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Directory holding the source data (`tests.json`, `overrides.csv`)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Root of generated output (OS data dir when omitted)
    #[serde(default)]
    pub output_root: Option<PathBuf>,

    /// Languages processed by override, translate and doctor stages
    #[serde(default = "default_languages")]
    pub languages: Vec<Language>,

    /// Target number of questions per test for the compose stage
    #[serde(default = "default_questions_per_test")]
    pub questions_per_test: usize,

    /// Compose mode: "skip" or "fix_missed"
    #[serde(default = "default_compose_mode")]
    pub compose_mode: String,

    /// Seed for compose sampling; entropy when omitted
    #[serde(default)]
    pub random_seed: Option<u64>,

    /// Number of store backups kept
    #[serde(default = "default_backup_retention")]
    pub backup_retention: usize,

    /// LLM response cache directory (`<output_root>/cache` when omitted)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Directory question images are resolved against
    #[serde(default)]
    pub images_dir: Option<PathBuf>,

    /// Exam wording used in LLM prompts
    #[serde(default = "default_test_type")]
    pub test_type: String,

    #[serde(default)]
    pub doctor: DoctorConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Doctor stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorConfig {
    /// Questions verified concurrently
    #[serde(default = "default_doctor_workers")]
    pub workers: usize,

    /// Run the LLM canonical-text checker
    #[serde(default)]
    pub canonical: bool,

    /// Run the LLM translation checker
    #[serde(default)]
    pub translation: bool,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            workers: default_doctor_workers(),
            canonical: false,
            translation: false,
        }
    }
}

/// Chat-completions endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts, multiplied by the attempt number
    #[serde(default = "default_llm_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            Error::Config(format!(
                "LLM API key not set (environment variable {})",
                self.api_key_env
            ))
        })
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_llm_api_key_env(),
            max_retries: default_llm_max_retries(),
            retry_delay_ms: default_llm_retry_delay_ms(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_domain() -> String {
    "default".to_string()
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_languages() -> Vec<Language> {
    Language::ALL.to_vec()
}

fn default_questions_per_test() -> usize {
    15
}

fn default_compose_mode() -> String {
    "skip".to_string()
}

fn default_backup_retention() -> usize {
    10
}

fn default_test_type() -> String {
    "driving theory test".to_string()
}

fn default_doctor_workers() -> usize {
    10
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_retry_delay_ms() -> u64 {
    1000
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PrebuildConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            data_path: default_data_path(),
            output_root: None,
            languages: default_languages(),
            questions_per_test: default_questions_per_test(),
            compose_mode: default_compose_mode(),
            random_seed: None,
            backup_retention: default_backup_retention(),
            cache_dir: None,
            images_dir: None,
            test_type: default_test_type(),
            doctor: DoctorConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PrebuildConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PrebuildConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::Config("domain must not be empty".to_string()));
        }
        if self.questions_per_test == 0 {
            return Err(Error::Config("questions_per_test must be positive".to_string()));
        }
        if self.doctor.workers == 0 {
            return Err(Error::Config("doctor.workers must be positive".to_string()));
        }
        if self.llm.max_retries == 0 {
            return Err(Error::Config("llm.max_retries must be positive".to_string()));
        }
        Ok(())
    }

    /// Output root, falling back to the OS-dependent data directory
    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(default_output_root)
    }

    /// `<output_root>/domains/<domain>`
    pub fn domain_dir(&self) -> PathBuf {
        self.output_root().join("domains").join(&self.domain)
    }

    /// Directory holding `prebuild.db` and its backups
    pub fn prebuild_dir(&self) -> PathBuf {
        self.domain_dir().join("prebuild")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.output_root().join("cache"))
    }

    /// Override table file inside the data directory
    pub fn overrides_path(&self) -> PathBuf {
        self.data_path.join("overrides.csv")
    }
}

/// OS-dependent default output root
fn default_output_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qdt"))
        .unwrap_or_else(|| PathBuf::from("./qdt_output"))
}

/// Resolve the config file path following the priority order:
/// CLI argument, `QDT_CONFIG`, `./qdt-prebuild.toml`.
///
/// Returns `None` when no file applies and built-in defaults should be used.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Working directory
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    None
}

/// Load configuration, falling back to built-in defaults when no file is found.
///
/// An explicitly named file (CLI or environment) that cannot be read is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<PrebuildConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Cannot read config file {:?}: {}", path, e))
            })?;
            info!("Loading configuration from {:?}", path);
            PrebuildConfig::from_toml_str(&content)
        }
        None => {
            info!("No configuration file found, using built-in defaults");
            Ok(PrebuildConfig::default())
        }
    }
}
