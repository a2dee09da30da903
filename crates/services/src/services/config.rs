use std::{path::Path, time::Duration};

use git::GitCliConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utils::diff::DiffOptions;

const CONFIG_VERSION: &str = "v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Engine settings stored as `config.json` in the asset directory.
#[derive(Clone, Debug, Serialize, Deserialize, TS, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub config_version: String,
    /// Executable name or absolute path of git.
    pub git_binary: String,
    pub query_timeout_secs: u64,
    pub mutation_timeout_secs: u64,
    pub context_lines: usize,
    pub word_diff_max_line_bytes: usize,
    pub word_diff_max_pairs: usize,
    pub line_diff_max_lines: usize,
    /// Entries per commit-addressed result cache.
    pub cache_capacity: u64,
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let diff = DiffOptions::default();
        Self {
            config_version: CONFIG_VERSION.to_string(),
            git_binary: "git".to_string(),
            query_timeout_secs: git::DEFAULT_QUERY_TIMEOUT.as_secs(),
            mutation_timeout_secs: git::DEFAULT_MUTATION_TIMEOUT.as_secs(),
            context_lines: diff.context_lines,
            word_diff_max_line_bytes: diff.word_diff_max_line_bytes,
            word_diff_max_pairs: diff.word_diff_max_pairs,
            line_diff_max_lines: diff.line_diff_max_lines,
            cache_capacity: 512,
            event_channel_capacity: 1024,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("query_timeout_secs", self.query_timeout_secs),
            ("mutation_timeout_secs", self.mutation_timeout_secs),
            ("line_diff_max_lines", self.line_diff_max_lines as u64),
            ("cache_capacity", self.cache_capacity),
            ("event_channel_capacity", self.event_channel_capacity as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be greater than zero"
            )));
        }
        if self.git_binary.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "git_binary must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn git_cli_config(&self) -> GitCliConfig {
        GitCliConfig {
            git_binary: self.git_binary.clone(),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            mutation_timeout: Duration::from_secs(self.mutation_timeout_secs),
        }
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            context_lines: self.context_lines,
            word_diff_max_line_bytes: self.word_diff_max_line_bytes,
            word_diff_max_pairs: self.word_diff_max_pairs,
            line_diff_max_lines: self.line_diff_max_lines,
        }
    }
}

impl From<String> for Config {
    fn from(raw_config: String) -> Self {
        match serde_json::from_str::<Config>(&raw_config) {
            Ok(config) => match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    tracing::warn!("Invalid config ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Config could not be parsed: {}, using defaults", e);
                Self::default()
            }
        }
    }
}

/// Will always return config, falling back to defaults
pub async fn load_config_from_file(config_path: &Path) -> Config {
    match tokio::fs::read_to_string(config_path).await {
        Ok(raw_config) => Config::from(raw_config),
        Err(_) => {
            tracing::info!("No config file found, creating one");
            Config::default()
        }
    }
}

/// Saves the config to the given path
pub async fn save_config_to_file(config: &Config, config_path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let raw_config = serde_json::to_string_pretty(config)?;
    tokio::fs::write(config_path, raw_config).await?;
    Ok(())
}
