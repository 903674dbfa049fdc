use std::{fmt, str::FromStr, time::Duration};

use chrono_tz::Tz;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub api_base: Url,
    pub allowed_chat_ids: Vec<i64>,
    pub timezone: Option<Tz>,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub polling: PollingConfig,
    pub broadcast: BroadcastConfig,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Server-side wait passed as `timeout` to `getUpdates`.
    pub long_poll_timeout: Duration,
    /// Local deadline for the whole `getUpdates` request. Always longer than
    /// `long_poll_timeout`.
    pub client_timeout: Duration,
    pub idle_delay: Duration,
    pub error_backoff: Duration,
    pub delivery: DeliveryMode,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            long_poll_timeout: Duration::from_secs(30),
            client_timeout: Duration::from_secs(35),
            idle_delay: Duration::from_secs(2),
            error_backoff: Duration::from_secs(2),
            delivery: DeliveryMode::AtMostOnce,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub send_delay: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            send_delay: Duration::from_millis(500),
        }
    }
}

/// When the poller acknowledges an update relative to replying to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Advance the cursor before replying; a crash or failed send loses the reply.
    #[default]
    AtMostOnce,
    /// Advance the cursor only once the reply went out; failures are fetched again.
    AtLeastOnce,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::AtMostOnce => "at-most-once",
            DeliveryMode::AtLeastOnce => "at-least-once",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "at-most-once" | "at_most_once" => Ok(DeliveryMode::AtMostOnce),
            "at-least-once" | "at_least_once" => Ok(DeliveryMode::AtLeastOnce),
            other => Err(ConfigError::Invalid {
                key: "DELIVERY_MODE",
                reason: format!("unknown delivery mode '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
