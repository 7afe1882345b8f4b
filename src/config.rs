use crate::error::AppError;
use crate::market::types::{BridgeArgs, BridgeConfig, StreamChannel};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_format: String,
    pub log_color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            log_color: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

/// Loads `.env` (when present) and then reads configuration from the
/// process environment.
pub fn load() -> Result<RuntimeConfig, AppError> {
    let _ = dotenvy::dotenv();
    load_from(|key| env::var(key).ok())
}

pub fn load_from<F>(lookup: F) -> Result<RuntimeConfig, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = LoggingConfig::default();
    let logging = LoggingConfig {
        log_level: env_str(&lookup, "LOG_LEVEL").unwrap_or(defaults.log_level),
        log_format: env_str(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
        log_color: env_parse(&lookup, "LOG_COLOR")?.unwrap_or(defaults.log_color),
    };

    let args = BridgeArgs {
        stream_base_url: env_str(&lookup, "BRIDGE_STREAM_URL"),
        rest_base_url: env_str(&lookup, "BRIDGE_REST_URL"),
        // Present-but-empty is meaningful here: it disables the proxy.
        proxy_base_url: lookup("BRIDGE_PROXY_URL"),
        channel: env_str(&lookup, "BRIDGE_CHANNEL")
            .map(|value| StreamChannel::parse(&value))
            .transpose()?,
        combined_stream: env_parse(&lookup, "BRIDGE_COMBINED_STREAM")?,
        assets: None,
        fallback_targets: None,
        reconnect_base_ms: env_parse(&lookup, "BRIDGE_RECONNECT_BASE_MS")?,
        reconnect_max_ms: env_parse(&lookup, "BRIDGE_RECONNECT_MAX_MS")?,
        reconnect_multiplier: env_parse(&lookup, "BRIDGE_RECONNECT_MULTIPLIER")?,
        staleness_check_ms: env_parse(&lookup, "BRIDGE_STALENESS_CHECK_MS")?,
        staleness_timeout_ms: env_parse(&lookup, "BRIDGE_STALENESS_TIMEOUT_MS")?,
        fallback_poll_ms: env_parse(&lookup, "BRIDGE_FALLBACK_POLL_MS")?,
        ui_sync_ms: env_parse(&lookup, "BRIDGE_UI_SYNC_MS")?,
        request_timeout_ms: env_parse(&lookup, "BRIDGE_REQUEST_TIMEOUT_MS")?,
    };

    Ok(RuntimeConfig {
        bridge: args.normalize()?,
        logging,
    })
}

fn env_str<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    env_str(lookup, key)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| AppError::InvalidArgument(format!("{key} has invalid value '{value}'")))
        })
        .transpose()
}
