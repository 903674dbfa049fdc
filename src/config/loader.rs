use std::{env, time::Duration};

use chrono_tz::Tz;
use url::Url;

use super::env::{
    AppConfig, BroadcastConfig, ConfigError, DeliveryMode, DirectoryConfig, LoggingConfig,
    PollingConfig,
};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_bot_token = var("TELEGRAM_BOT_TOKEN")
            .or_else(|| var("BOT_TOKEN"))
            .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;

        let api_base_raw = var("TELEGRAM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_base = Url::parse(&api_base_raw).map_err(|err| ConfigError::Invalid {
            key: "TELEGRAM_API_BASE",
            reason: err.to_string(),
        })?;
        if !matches!(api_base.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                key: "TELEGRAM_API_BASE",
                reason: format!("unsupported scheme '{}'", api_base.scheme()),
            });
        }

        let allowed_chat_ids = var("ALLOWED_CHAT_IDS")
            .map(|value| {
                value
                    .split(',')
                    .filter_map(|part| part.trim().parse::<i64>().ok())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let timezone = match var("BOT_TIMEZONE") {
            Some(name) => Some(name.parse::<Tz>().map_err(|err| ConfigError::Invalid {
                key: "BOT_TIMEZONE",
                reason: err.to_string(),
            })?),
            None => None,
        };

        let directories = DirectoryConfig {
            logs_dir: var("LOGS_DIR").unwrap_or_else(|| "logs".to_string()),
        };

        let logging = LoggingConfig {
            level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        let defaults = PollingConfig::default();
        let polling = PollingConfig {
            long_poll_timeout: parse_u64(&var, "POLL_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.long_poll_timeout),
            client_timeout: parse_u64(&var, "POLL_CLIENT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.client_timeout),
            idle_delay: parse_u64(&var, "POLL_IDLE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.idle_delay),
            error_backoff: parse_u64(&var, "POLL_ERROR_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.error_backoff),
            delivery: match var("DELIVERY_MODE") {
                Some(value) => value.parse::<DeliveryMode>()?,
                None => DeliveryMode::default(),
            },
        };
        if polling.client_timeout <= polling.long_poll_timeout {
            return Err(ConfigError::Invalid {
                key: "POLL_CLIENT_TIMEOUT_SECS",
                reason: format!(
                    "client timeout {:?} must exceed the long-poll timeout {:?}",
                    polling.client_timeout, polling.long_poll_timeout
                ),
            });
        }

        let broadcast = BroadcastConfig {
            send_delay: parse_u64(&var, "BROADCAST_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(BroadcastConfig::default().send_delay),
        };

        let request_timeout = parse_u64(&var, "REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        Ok(Self {
            telegram_bot_token,
            api_base,
            allowed_chat_ids,
            timezone,
            directories,
            logging,
            polling,
            broadcast,
            request_timeout,
        })
    }
}

/// Unset means default; a value that is set but not a number is rejected.
fn parse_u64<F>(var: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|value| {
            value.parse::<u64>().map_err(|err| ConfigError::Invalid {
                key,
                reason: format!("'{value}' is not a whole number: {err}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN")));

        let err = load(&[("TELEGRAM_BOT_TOKEN", "   ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn defaults_follow_long_poll_contract() {
        let config = load(&[("BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(config.telegram_bot_token, "123:abc");
        assert_eq!(config.api_base.as_str(), "https://api.telegram.org/");
        assert_eq!(config.polling.long_poll_timeout, Duration::from_secs(30));
        assert_eq!(config.polling.client_timeout, Duration::from_secs(35));
        assert_eq!(config.polling.idle_delay, Duration::from_secs(2));
        assert_eq!(config.polling.delivery, DeliveryMode::AtMostOnce);
        assert_eq!(config.broadcast.send_delay, Duration::from_millis(500));
        assert!(config.timezone.is_none());
        assert!(config.allowed_chat_ids.is_empty());
    }

    #[test]
    fn client_timeout_must_exceed_server_wait() {
        let err = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("POLL_TIMEOUT_SECS", "30"),
            ("POLL_CLIENT_TIMEOUT_SECS", "30"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "POLL_CLIENT_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn parses_optional_settings() {
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ALLOWED_CHAT_IDS", "-1001, 42, nope"),
            ("BOT_TIMEZONE", "Europe/Berlin"),
            ("DELIVERY_MODE", "at-least-once"),
            ("BROADCAST_DELAY_MS", "0"),
        ])
        .unwrap();
        assert_eq!(config.allowed_chat_ids, vec![-1001, 42]);
        assert_eq!(config.timezone, Some(chrono_tz::Europe::Berlin));
        assert_eq!(config.polling.delivery, DeliveryMode::AtLeastOnce);
        assert_eq!(config.broadcast.send_delay, Duration::ZERO);
    }

    #[test]
    fn rejects_bad_timezone_and_delivery_mode() {
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "t"), ("BOT_TIMEZONE", "Mars/Base")]).is_err());
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "t"), ("DELIVERY_MODE", "exactly-once")]).is_err());
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "t"), ("TELEGRAM_API_BASE", "ftp://x")]).is_err());
    }

    #[test]
    fn malformed_numbers_are_rejected_not_defaulted() {
        let err = load(&[("TELEGRAM_BOT_TOKEN", "t"), ("POLL_TIMEOUT_SECS", "abc")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "POLL_TIMEOUT_SECS",
                ..
            }
        ));

        let err = load(&[("TELEGRAM_BOT_TOKEN", "t"), ("BROADCAST_DELAY_MS", "-5")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "BROADCAST_DELAY_MS",
                ..
            }
        ));
    }
}
