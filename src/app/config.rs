//! TOML configuration loading
//!
//! Values come from three layers, lowest first: built-in defaults, the
//! configuration file, command line flags.

use crate::app::args::Args;
use crate::core::error_handling::ContextualError;
use crate::core::logging::{LogFormat, LOG_LEVELS};
use crate::pipeline::AgeParityPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{message}")]
    NotFound { path: PathBuf, message: String },

    #[error("{message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Parse { path: PathBuf, message: String },

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    fn not_found(path: &Path) -> Self {
        Self::NotFound {
            path: path.to_path_buf(),
            message: format!(
                "The specified configuration file does not exist: {}",
                path.display()
            ),
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: format!(
                "Error reading configuration file {}: {}",
                path.display(),
                source
            ),
            source,
        }
    }

    fn parse(path: &Path, error: impl fmt::Display) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: format!(
                "Error parsing configuration file {}: {}",
                path.display(),
                error
            ),
        }
    }
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        true
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ConfigError::NotFound { message, .. }
            | ConfigError::Io { message, .. }
            | ConfigError::Parse { message, .. } => Some(message),
            ConfigError::Invalid(message) => Some(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Jsonl,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "jsonl" => Ok(StoreKind::Jsonl),
            "memory" => Ok(StoreKind::Memory),
            other => Err(ConfigError::Invalid(format!(
                "Unknown store kind '{}' (expected 'jsonl' or 'memory')",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Jsonl => write!(f, "jsonl"),
            StoreKind::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub topic: String,
    pub max_age_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            topic: "lanerouter".to_string(),
            max_age_secs: AgeParityPolicy::DEFAULT_MAX_AGE_SECS as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub kind: StoreKind,
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            kind: StoreKind::Jsonl,
            path: PathBuf::from("./lanerouter-data"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SenderSection {
    /// 0 disables the demo sender
    pub interval_ms: u64,
    /// 0 sends until shutdown
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: String,
    pub format: String,
    pub file: String,
    /// Unset means colored only on a terminal
    pub color: Option<bool>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: "none".to_string(),
            color: None,
        }
    }
}

/// Fully resolved application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub pipeline: PipelineSection,
    pub store: StoreSection,
    pub sender: SenderSection,
    pub logging: LoggingSection,
}

/// Default configuration file location, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("Lanerouter").join("lanerouter.toml"))
}

impl Settings {
    /// Load settings from `config_file`, or from the default location.
    ///
    /// An explicitly named file must exist. A missing default file means
    /// built-in defaults.
    pub async fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::not_found(path));
                }
                path.to_path_buf()
            }
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    log::debug!("No configuration file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::io(&path, e))?;
        let settings = Self::from_toml_str(&contents, &path)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(settings)
    }

    /// Parse a TOML document; `origin` only labels errors
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::parse(origin, e))
    }

    /// Overlay command line flags on top of file values
    pub fn apply_args(&mut self, args: &Args) -> Result<(), ConfigError> {
        if let Some(topic) = &args.topic {
            self.pipeline.topic = topic.clone();
        }
        if let Some(max_age) = args.max_age_secs {
            self.pipeline.max_age_secs = max_age;
        }
        if let Some(kind) = &args.store {
            self.store.kind = kind.parse()?;
        }
        if let Some(path) = &args.store_path {
            self.store.path = path.clone();
        }
        if let Some(interval) = args.send_interval_ms {
            self.sender.interval_ms = interval;
        }
        if let Some(count) = args.send_count {
            self.sender.count = count;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = &args.log_format {
            self.logging.format = format.clone();
        }
        if let Some(file) = &args.log_file {
            self.logging.file = file.clone();
        }
        if let Some(color) = args.color_choice() {
            self.logging.color = Some(color);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.topic.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.topic must not be empty".to_string(),
            ));
        }
        if self.pipeline.max_age_secs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_age_secs must be greater than zero".to_string(),
            ));
        }
        if Self::max_age_from_secs(self.pipeline.max_age_secs).is_none() {
            return Err(ConfigError::Invalid(format!(
                "pipeline.max_age_secs is too large: {}",
                self.pipeline.max_age_secs
            )));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Unknown log level '{}' (expected one of: {})",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        LogFormat::parse(&self.logging.format).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "Unknown log format '{}' (expected text, ext or json)",
                self.logging.format
            ))
        })
    }

    /// Log file, `None` when logging to stderr
    pub fn log_file(&self) -> Option<&str> {
        let file = self.logging.file.trim();
        if file.is_empty() || file.eq_ignore_ascii_case("none") || file == "-" {
            None
        } else {
            Some(file)
        }
    }

    /// Age at which messages are dropped, capped at the largest representable
    /// duration for settings that skipped `validate`
    pub fn max_age(&self) -> chrono::Duration {
        Self::max_age_from_secs(self.pipeline.max_age_secs).unwrap_or(chrono::Duration::MAX)
    }

    fn max_age_from_secs(secs: u64) -> Option<chrono::Duration> {
        i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
    }

    /// Demo sender interval, `None` when the sender is disabled
    pub fn send_interval(&self) -> Option<std::time::Duration> {
        match self.sender.interval_ms {
            0 => None,
            ms => Some(std::time::Duration::from_millis(ms)),
        }
    }
}
