pub mod env_substitution;

use research_core::{ResearchError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use env_substitution::substitute_env_vars;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub assistant: AssistantSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantSettings {
    #[serde(default = "default_name")]
    pub name: String,
    /// Upper bound on a single external query; `None` waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_timeout_secs: Option<u64>,
    /// Program (plus arguments) that answers queries over stdin/stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_command: Option<Vec<String>>,
}

/// Retention policy injected into the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,
    #[serde(default = "default_max_session_age_hours")]
    pub max_session_age_hours: u64,
    /// Period of the expired-session sweeper, 0 disables it.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl AssistantConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ResearchError::ConfigError(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut raw: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| ResearchError::ConfigError(format!("Failed to parse YAML: {}", e)))?;
        substitute_env_vars(&mut raw)?;

        // An empty document parses to null; treat it as "all defaults".
        let mut config: AssistantConfig = if raw.is_null() {
            AssistantConfig::default()
        } else {
            serde_yaml::from_value(raw)
                .map_err(|e| ResearchError::ConfigError(format!("Invalid configuration: {}", e)))?
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    fn expand_env_vars(&mut self) {
        if let Ok(home_dir) = env::var("RESEARCH_HOME") {
            self.paths.home_dir = PathBuf::from(home_dir);
        }
        if let Ok(data_dir) = env::var("RESEARCH_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(data_dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.assistant.name.is_empty() {
            return Err(ResearchError::ConfigError("Assistant name cannot be empty".into()));
        }
        if self.session.max_history_length == 0 {
            return Err(ResearchError::ConfigError(
                "max_history_length must be at least 1".into(),
            ));
        }
        if self.assistant.query_timeout_secs == Some(0) {
            return Err(ResearchError::ConfigError(
                "query_timeout_secs must be positive when set".into(),
            ));
        }
        if let Some(command) = &self.assistant.answer_command {
            if command.first().map_or(true, |program| program.trim().is_empty()) {
                return Err(ResearchError::ConfigError("answer_command cannot be empty".into()));
            }
        }
        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ResearchError::ConfigError(format!(
                "Unknown log level: {}",
                self.logging.level
            )));
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.assistant.query_timeout_secs.map(Duration::from_secs)
    }

    pub fn default_config_path() -> PathBuf {
        default_home_dir().join(".research-assistant").join("config.yaml")
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            query_timeout_secs: None,
            answer_command: None,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_history_length: default_max_history_length(),
            max_session_age_hours: default_max_session_age_hours(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl SessionSettings {
    pub fn new(max_history_length: usize, max_session_age_hours: u64) -> Self {
        Self {
            max_history_length,
            max_session_age_hours,
            ..Self::default()
        }
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_name() -> String { "research-assistant".to_string() }
fn default_max_history_length() -> usize { 10 }
fn default_max_session_age_hours() -> u64 { 24 }
fn default_cleanup_interval_secs() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }

fn default_home_dir() -> PathBuf {
    env::var("RESEARCH_HOME")
        .unwrap_or_else(|_| env::var("HOME").unwrap_or_else(|_| ".".to_string()))
        .into()
}

fn default_data_dir() -> PathBuf {
    env::var("RESEARCH_DATA_DIR")
        .unwrap_or_else(|_| "./data".to_string())
        .into()
}
