use std::{path::PathBuf, time::Duration};

/// Core error type for the notifier.
///
/// Adapter crates map their transport errors into `External` so the dispatch
/// core can report delivery failures uniformly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("unit not available")]
    NotAvailable,

    #[error("notification queue is full")]
    QueueFull,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported config file: {path}")]
    UnsupportedConfigFile { path: PathBuf },

    #[error("external error: {0}")]
    External(String),
}

/// Validation failures for a raw notifier configuration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("notifier config is missing")]
    NilConfig,

    #[error("bad telegram bot token")]
    MissingToken,

    #[error("bad telegram chat ID: no recipients configured")]
    MissingRecipients,

    #[error("bad log level: {0:?}")]
    BadLevelName(String),

    #[error("failed to parse chat ids from environment variable {var:?}: {reason}")]
    BadRecipientList { var: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
