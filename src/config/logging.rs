use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

fn default_dir() -> String {
    "logs".to_string()
}

fn default_filename() -> String {
    "server.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_format() -> LogFormat {
    LogFormat::Text
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level directive; `RUST_LOG` wins when this is unset.
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default = "default_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub enable_file_logging: bool,
    #[serde(default = "default_dir")]
    pub dir: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    /// "hourly", "daily" or "never".
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: default_format(),
            enable_file_logging: false,
            dir: default_dir(),
            filename: default_filename(),
            rotation: default_rotation(),
        }
    }
}
