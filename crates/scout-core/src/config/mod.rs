//! Process-wide configuration: built-in defaults, overridden by a TOML file,
//! overridden again by `SCOUTD_`-prefixed environment variables.
//!
//! Individual scouts are persisted rows (see [`crate::storage`]), not config
//! entries — this module only covers settings that apply to the whole daemon:
//! where the database lives, which LLM provider to use by default, where logs
//! go, and where the scheduler's PID lock file is kept.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Default LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Deduplication settings.
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Web search adapter settings.
    #[serde(default)]
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingConfig::default(),
            scheduler: SchedulerConfig::default(),
            telemetry: TelemetryConfig::default(),
            dedup: DedupConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

/// Where the SQLite database lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Path to the SQLite database file. Supports `~` expansion.
    pub db_path: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            db_path: "~/.scoutd/scout.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Default LLM provider selection and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Which provider to use when a scout does not specify one: "anthropic" or "google".
    pub provider: String,
    /// Model identifier passed to the provider.
    pub model: String,
    /// API key. Usually supplied via the `SCOUTD_LLM__API_KEY` env override, never committed to disk.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// Logging and per-run log file settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Directory for the rotating application log.
    pub log_dir: String,
    /// Directory under which per-run scout logs are written (`<log_dir>/scouts/<name>/...`).
    pub scout_log_dir: String,
    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or "scout_core=debug".
    pub filter: String,
    /// Number of days to retain per-run scout logs before they're eligible for cleanup.
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_dir: "~/.scoutd/logs".to_string(),
            scout_log_dir: "~/.scoutd/logs/scouts".to_string(),
            filter: "info".to_string(),
            retention_days: 30,
        }
    }
}

/// Scheduler process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Path to the PID lock file that enforces the single-scheduler invariant.
    pub pid_file: String,
    /// How often, in seconds, the scheduler re-scans the scout table for changes.
    pub rescan_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            pid_file: "~/.scoutd/scheduler.pid".to_string(),
            rescan_interval_secs: 60,
        }
    }
}

/// Telemetry export settings (OTLP). Absent/disabled telemetry never changes behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Whether span export is enabled.
    pub enabled: bool,
    /// OTLP collector endpoint, if enabled.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            enabled: false,
            endpoint: None,
        }
    }
}

/// Deduplication thresholds (see [`crate::dedup`] for the resolution of the
/// 0.85 vs 0.95 Open Question).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DedupConfig {
    /// Cosine-similarity threshold for retrieved-item dedup.
    pub retrieved_item_threshold: f32,
    /// Cosine-similarity threshold for draft-vs-emitted dedup.
    pub draft_threshold: f32,
    /// Whether the semantic (embedding) backend is enabled at all, or only exact-hash dedup runs.
    pub semantic_enabled: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            retrieved_item_threshold: 0.85,
            draft_threshold: 0.95,
            semantic_enabled: true,
        }
    }
}

/// Settings for the `search`-kind scout's web search adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Endpoint of a Brave/Bing/SearX-style JSON search API.
    pub endpoint: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            endpoint: "https://api.search.brave.com/res/v1/web/search".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the default path, applies environment
    /// overrides, and validates the result.
    pub fn load_and_validate() -> Result<Config, Vec<ConfigError>> {
        let path = resolve_config_path();
        let mut config = Config::load(&path).map_err(|e| vec![e])?;
        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::ParseError { source })
    }

    /// Validates the configuration, collecting every violation rather than
    /// stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.storage.db_path.trim().is_empty() {
            errors.push(ConfigError::InvalidValue {
                field: "storage.db_path".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.storage.max_connections == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "storage.max_connections".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !["anthropic", "google"].contains(&self.llm.provider.as_str()) {
            errors.push(ConfigError::InvalidValue {
                field: "llm.provider".to_string(),
                message: format!("unknown provider '{}'", self.llm.provider),
            });
        }
        if self.llm.model.trim().is_empty() {
            errors.push(ConfigError::InvalidValue {
                field: "llm.model".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.llm.timeout_secs == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "llm.timeout_secs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.dedup.retrieved_item_threshold) {
            errors.push(ConfigError::InvalidValue {
                field: "dedup.retrieved_item_threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.dedup.draft_threshold) {
            errors.push(ConfigError::InvalidValue {
                field: "dedup.draft_threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.telemetry.enabled && self.telemetry.endpoint.is_none() {
            errors.push(ConfigError::InvalidValue {
                field: "telemetry.endpoint".to_string(),
                message: "required when telemetry.enabled is true".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Finds the config file path: `$SCOUTD_CONFIG` if set, else `~/.scoutd/config.toml`.
pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("SCOUTD_CONFIG") {
        return PathBuf::from(path);
    }
    expand_tilde("~/.scoutd/config.toml")
}

/// Expands a leading `~` in `path` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Applies `SCOUTD_SECTION__FIELD`-style environment variable overrides in place.
///
/// For example `SCOUTD_STORAGE__DB_PATH=/tmp/scout.db` overrides
/// `config.storage.db_path`.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(v) = env_str("SCOUTD_STORAGE__DB_PATH") {
        config.storage.db_path = v;
    }
    if let Some(v) = env_u32("SCOUTD_STORAGE__MAX_CONNECTIONS") {
        config.storage.max_connections = v;
    }
    if let Some(v) = env_str("SCOUTD_LLM__PROVIDER") {
        config.llm.provider = v;
    }
    if let Some(v) = env_str("SCOUTD_LLM__MODEL") {
        config.llm.model = v;
    }
    if let Some(v) = env_str("SCOUTD_LLM__API_KEY") {
        config.llm.api_key = Some(v);
    }
    if let Some(v) = env_u64("SCOUTD_LLM__TIMEOUT_SECS") {
        config.llm.timeout_secs = v;
    }
    if let Some(v) = env_str("SCOUTD_LOGGING__LOG_DIR") {
        config.logging.log_dir = v;
    }
    if let Some(v) = env_str("SCOUTD_LOGGING__SCOUT_LOG_DIR") {
        config.logging.scout_log_dir = v;
    }
    if let Some(v) = env_str("SCOUTD_LOGGING__FILTER") {
        config.logging.filter = v;
    }
    if let Some(v) = env_u32("SCOUTD_LOGGING__RETENTION_DAYS") {
        config.logging.retention_days = v;
    }
    if let Some(v) = env_str("SCOUTD_SCHEDULER__PID_FILE") {
        config.scheduler.pid_file = v;
    }
    if let Some(v) = env_u64("SCOUTD_SCHEDULER__RESCAN_INTERVAL_SECS") {
        config.scheduler.rescan_interval_secs = v;
    }
    if let Some(v) = env_bool("SCOUTD_TELEMETRY__ENABLED") {
        config.telemetry.enabled = v;
    }
    if let Some(v) = env_str("SCOUTD_TELEMETRY__ENDPOINT") {
        config.telemetry.endpoint = Some(v);
    }
    if let Some(v) = env_f32("SCOUTD_DEDUP__RETRIEVED_ITEM_THRESHOLD") {
        config.dedup.retrieved_item_threshold = v;
    }
    if let Some(v) = env_f32("SCOUTD_DEDUP__DRAFT_THRESHOLD") {
        config.dedup.draft_threshold = v;
    }
    if let Some(v) = env_bool("SCOUTD_DEDUP__SEMANTIC_ENABLED") {
        config.dedup.semantic_enabled = v;
    }
    if let Some(v) = env_str("SCOUTD_SEARCH__ENDPOINT") {
        config.search.endpoint = v;
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|v| v.parse().ok())
}

fn env_f32(key: &str) -> Option<f32> {
    env_str(key).and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).and_then(|v| match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    })
}
