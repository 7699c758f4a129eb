use std::{env, fmt, fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    domain::{ChatId, LogLevel},
    errors::{ConfigError, Error},
    Result,
};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;
pub const DEFAULT_MESSAGE_CAPTION: &str = "Log Message";

/// Where the hook takes the timestamp appended to forwarded log messages from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampMode {
    #[default]
    None,
    Local,
    Utc,
}

/// Notifier configuration as written by the operator (TOML or JSON).
///
/// Nothing here is trusted until it went through [`validate`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub bot_token: String,
    /// Name of an environment variable holding the bot token. A non-empty
    /// value of that variable wins over `bot_token`.
    pub bot_token_env_var: String,

    /// Receivers of notifications.
    pub chat_ids: Vec<i64>,
    /// Name of an environment variable holding a comma-separated chat id list.
    pub chat_ids_env_var: String,

    /// Levels a log event must have to be forwarded by the hook.
    /// None configured means the hook forwards nothing.
    pub log_levels: Vec<String>,
    /// If non-empty, a forwarded log message must start with one of these.
    pub prefixes: Vec<String>,
    /// If non-empty, a forwarded log event must carry at least one of these fields.
    pub with_keys: Vec<String>,

    pub message_caption: Option<String>,
    pub app_tag: Option<String>,
    pub timestamp: TimestampMode,

    pub send_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub queue_capacity: Option<usize>,
}

impl RawConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load a config file, picking the format from the extension.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            _ => Err(Error::UnsupportedConfigFile {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Immutable, validated notifier configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub token: String,
    pub recipients: Vec<ChatId>,
    pub level_filter: Vec<LogLevel>,
    pub prefix_filter: Vec<String>,
    pub with_keys: Vec<String>,
    pub message_caption: String,
    pub app_tag: Option<String>,
    pub timestamp: TimestampMode,
    pub send_timeout: Duration,
    /// Upper bound on building the delivery backend when the unit starts.
    pub connect_timeout: Duration,
    pub queue_capacity: usize,
}

impl ValidatedConfig {
    /// Minimal config for a set of recipients; everything else at defaults.
    pub fn new(token: impl Into<String>, recipients: Vec<ChatId>) -> Self {
        Self {
            token: token.into(),
            recipients,
            level_filter: Vec::new(),
            prefix_filter: Vec::new(),
            with_keys: Vec::new(),
            message_caption: DEFAULT_MESSAGE_CAPTION.to_string(),
            app_tag: None,
            timestamp: TimestampMode::None,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("token", &"<redacted>")
            .field("recipients", &self.recipients)
            .field("level_filter", &self.level_filter)
            .field("prefix_filter", &self.prefix_filter)
            .field("with_keys", &self.with_keys)
            .field("message_caption", &self.message_caption)
            .field("app_tag", &self.app_tag)
            .field("timestamp", &self.timestamp)
            .field("send_timeout", &self.send_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

/// Validate against the process environment.
pub fn validate(raw: Option<&RawConfig>) -> std::result::Result<ValidatedConfig, ConfigError> {
    validate_with_env(raw, |key| env::var(key).ok())
}

/// Validate with an injected environment lookup.
pub fn validate_with_env(
    raw: Option<&RawConfig>,
    lookup: impl Fn(&str) -> Option<String>,
) -> std::result::Result<ValidatedConfig, ConfigError> {
    let raw = raw.ok_or(ConfigError::NilConfig)?;

    let token = match env_override(&raw.bot_token_env_var, &lookup) {
        Some(v) => v,
        None if raw.bot_token.trim().is_empty() => return Err(ConfigError::MissingToken),
        None => raw.bot_token.clone(),
    };

    let recipients = match env_override(&raw.chat_ids_env_var, &lookup) {
        Some(v) => parse_chat_ids(&v).map_err(|reason| ConfigError::BadRecipientList {
            var: raw.chat_ids_env_var.clone(),
            reason,
        })?,
        None if raw.chat_ids.is_empty() => return Err(ConfigError::MissingRecipients),
        None => raw.chat_ids.iter().copied().map(ChatId).collect(),
    };

    let mut level_filter = Vec::with_capacity(raw.log_levels.len());
    for name in &raw.log_levels {
        // Accepted, but matches no event.
        if name.trim().eq_ignore_ascii_case("disabled") {
            continue;
        }
        let level =
            LogLevel::parse(name).ok_or_else(|| ConfigError::BadLevelName(name.clone()))?;
        if !level_filter.contains(&level) {
            level_filter.push(level);
        }
    }

    let send_timeout = raw
        .send_timeout_secs
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SEND_TIMEOUT);
    let connect_timeout = raw
        .connect_timeout_secs
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
    let queue_capacity = raw
        .queue_capacity
        .filter(|c| *c > 0)
        .unwrap_or(DEFAULT_QUEUE_CAPACITY);

    Ok(ValidatedConfig {
        token,
        recipients,
        level_filter,
        prefix_filter: raw.prefixes.clone(),
        with_keys: raw.with_keys.clone(),
        message_caption: raw
            .message_caption
            .clone()
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_MESSAGE_CAPTION.to_string()),
        app_tag: raw.app_tag.clone().and_then(non_empty),
        timestamp: raw.timestamp,
        send_timeout,
        connect_timeout,
        queue_capacity,
    })
}

/// Parse a chat id list: a single id or a comma-separated list.
pub fn parse_chat_ids(s: &str) -> std::result::Result<Vec<ChatId>, String> {
    s.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<i64>()
                .map(ChatId)
                .map_err(|e| format!("{part:?}: {e}"))
        })
        .collect()
}

fn env_override(var: &str, lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    if var.trim().is_empty() {
        return None;
    }
    lookup(var.trim()).and_then(non_empty)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
