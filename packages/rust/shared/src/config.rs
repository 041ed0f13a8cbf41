//! Application configuration for Docent.
//!
//! User config lives at `~/.docent/docent.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocentError, Result};
use crate::types::StageKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docent.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docent";

// ---------------------------------------------------------------------------
// Config structs (matching docent.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// File locations and session defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Stage backend settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding the memory file, conversation log and database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Memory log file name (also the progress log).
    #[serde(default = "default_memory_file")]
    pub memory_file: String,

    /// Conversation log file name.
    #[serde(default = "default_conversation_log")]
    pub conversation_log: String,

    /// Analysis database file name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Input that ends an interactive session.
    #[serde(default = "default_exit_sentinel")]
    pub exit_sentinel: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            memory_file: default_memory_file(),
            conversation_log: default_conversation_log(),
            database: default_database(),
            exit_sentinel: default_exit_sentinel(),
        }
    }
}

fn default_data_dir() -> String {
    ".".into()
}
fn default_memory_file() -> String {
    "progress.md".into()
}
fn default_conversation_log() -> String {
    "conversation_log.txt".into()
}
fn default_database() -> String {
    "docent.db".into()
}
fn default_exit_sentinel() -> String {
    "exit".into()
}

impl DefaultsConfig {
    /// Absolute-or-relative path of the memory file.
    pub fn memory_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.memory_file)
    }

    /// Path of the conversation log.
    pub fn conversation_log_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.conversation_log)
    }

    /// Path of the analysis database.
    pub fn database_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.database)
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used by every stage without an override.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-stage model overrides, keyed by stage name (`reader`, `qna`, ...).
    #[serde(default)]
    pub stage_models: HashMap<String, String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            stage_models: HashMap::new(),
        }
    }
}

impl LlmConfig {
    /// Model bound to `stage`, falling back to the default model.
    pub fn model_for(&self, stage: StageKind) -> &str {
        self.stage_models
            .get(stage.as_str())
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4.1-mini".into()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Characters of extracted document text forwarded to the Reader.
    #[serde(default = "default_document_chars")]
    pub document_chars: usize,

    /// Characters of cached raw text forwarded to QnA.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Maximum number of analyzed documents kept in memory.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Run Critic and Innovator concurrently.
    #[serde(default)]
    pub parallel_review: bool,

    /// Persist analyses in the database across runs.
    #[serde(default = "default_true")]
    pub persist_analysis: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            document_chars: default_document_chars(),
            excerpt_chars: default_excerpt_chars(),
            cache_capacity: default_cache_capacity(),
            parallel_review: false,
            persist_analysis: true,
        }
    }
}

fn default_document_chars() -> usize {
    24_000
}
fn default_excerpt_chars() -> usize {
    4_000
}
fn default_cache_capacity() -> usize {
    16
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Pipeline options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Reader input bound, in characters.
    pub document_chars: usize,
    /// QnA raw-text excerpt bound, in characters.
    pub excerpt_chars: usize,
    /// In-memory cache bound, in documents.
    pub cache_capacity: usize,
    /// Run Critic and Innovator concurrently.
    pub parallel_review: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            document_chars: config.pipeline.document_chars,
            excerpt_chars: config.pipeline.excerpt_chars,
            cache_capacity: config.pipeline.cache_capacity.max(1),
            parallel_review: config.pipeline.parallel_review,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docent/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DocentError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docent/docent.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocentError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocentError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocentError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocentError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocentError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the API key env var is set and non-empty, returning its value.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(DocentError::config(format!(
            "API key not found. Set the {var_name} environment variable \
             (a .env file in the working directory is also read)."
        ))),
    }
}
