//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tally_core::conversation::DEFAULT_TOKEN_LIMIT;
use tally_core::{CompactionConfig, DataDetail, SessionConfig, TierThresholds};

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "TALLY_API_KEY";

const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_PROJECT_FILES: usize = 2000;

/// Configuration for tally
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the assistant service
    pub base_url: String,
    /// API key (alternative to the environment variable)
    pub api_key: Option<String>,
    /// Token ceiling for each conversation
    pub token_limit: u64,
    /// Timeout for each message send
    pub timeout_secs: u64,
    pub compaction: CompactionConfig,
    pub tiers: TierThresholds,
    pub context: ContextConfig,
}

/// Where shared context comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Directory scanned for CSV data sources, relative to the working directory
    pub data_dir: Option<String>,
    /// Directory holding skill documents, relative to the working directory
    pub skills_dir: Option<String>,
    /// Send recent commits along with the git status
    pub include_git_history: bool,
    pub data_detail: DataDetail,
    /// Stop listing project files after this many
    pub max_project_files: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            token_limit: DEFAULT_TOKEN_LIMIT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            compaction: CompactionConfig::default(),
            tiers: TierThresholds::default(),
            context: ContextConfig::default(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            skills_dir: None,
            include_git_history: false,
            data_detail: DataDetail::Full,
            max_project_files: DEFAULT_MAX_PROJECT_FILES,
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TALLY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        Self::default().save()?;
        Ok(path)
    }

    /// API key from the config, then the environment
    pub fn api_key(&self) -> Option<String> {
        tally_ai::providers::get_api_key(self.api_key.as_deref(), API_KEY_ENV).ok()
    }

    /// Session settings derived from this config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            compaction: self.compaction.clone(),
            tiers: self.tiers,
            data_detail: self.context.data_detail,
            git_history: self.context.include_git_history,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tally configuration file
# Place at ~/.config/tally/config.toml (Linux/Mac) or %APPDATA%\tally\config.toml (Windows)

# Assistant service
base_url = "http://localhost:8080/v1"

# API key (optional - TALLY_API_KEY is used when unset)
# api_key = "..."

# Token ceiling for each conversation
token_limit = 128000

# Seconds to wait for each reply
timeout_secs = 120

[compaction]
# Warn when usage reaches this share of the limit
warn_at = 0.80
# Compact when usage reaches this share of the limit
compact_at = 0.85
# Recent exchanges kept verbatim when compacting
preserve_recent = 2
# Compact automatically after a reply crosses compact_at
auto = true
timeout_secs = 180

[tiers]
# A batch of files up to this many lines is sent in full
full_max_lines = 2000
# Up to this many lines it is sent as outlines
summary_max_lines = 5000
# A single file above this many lines is never sent in full
large_file_lines = 800

[context]
# data_dir = "data"
# skills_dir = ".tally/skills"
include_git_history = false
# full or shape
data_detail = "full"
max_project_files = 2000
"#
}
