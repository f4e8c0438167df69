//! Process configuration from the environment

use crate::connection::ConnectionPolicy;
use crate::notify::SmsSettings;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:3000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{var} is required when BOT_SMS_URL is set")]
    MissingSms { var: &'static str },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub auth_dir: PathBuf,
    pub gateway_url: String,
    pub currency_symbol: String,
    pub catalog_seed: Option<PathBuf>,
    pub sms: Option<SmsSettings>,
    pub connection: ConnectionPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset and empty values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
        let base = PathBuf::from(home).join(".ordering-bot");

        let defaults = ConnectionPolicy::default();
        let connection = ConnectionPolicy {
            send_retries: parse_or(&get, "BOT_SEND_RETRIES", defaults.send_retries)?,
            send_base_delay: millis_or(&get, "BOT_SEND_BASE_DELAY_MS", defaults.send_base_delay)?,
            max_reconnect_attempts: parse_or(&get, "BOT_MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts)?,
            reconnect_delay: millis_or(&get, "BOT_RECONNECT_DELAY_MS", defaults.reconnect_delay)?,
            health_interval: defaults.health_interval,
        };
        if connection.send_retries == 0 {
            return Err(ConfigError::Invalid {
                var: "BOT_SEND_RETRIES",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            db_path: get("BOT_DB_PATH").map_or_else(|| base.join("bot.db"), PathBuf::from),
            port: parse_or(&get, "BOT_PORT", 8000)?,
            auth_dir: get("BOT_AUTH_DIR").map_or_else(|| base.join("session"), PathBuf::from),
            gateway_url: get("BOT_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            currency_symbol: get("BOT_CURRENCY_SYMBOL").unwrap_or_else(|| "$".to_string()),
            catalog_seed: get("BOT_CATALOG_SEED").map(PathBuf::from),
            sms: sms_settings(&get)?,
            connection,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn millis_or(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(get, var, default_ms).map(Duration::from_millis)
}

fn sms_settings(get: &impl Fn(&str) -> Option<String>) -> Result<Option<SmsSettings>, ConfigError> {
    let Some(url) = get("BOT_SMS_URL") else {
        return Ok(None);
    };
    let require = |var: &'static str| get(var).ok_or(ConfigError::MissingSms { var });
    Ok(Some(SmsSettings {
        url,
        api_key: require("BOT_SMS_API_KEY")?,
        sender: require("BOT_SMS_SENDER")?,
        recipient: require("BOT_SMS_RECIPIENT")?,
    }))
}
