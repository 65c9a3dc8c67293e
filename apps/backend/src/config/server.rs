use std::env;
use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::error::AppError;
use crate::services::session_router::RouterConfig;

/// Inbound WebSocket message budget per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsRateLimit {
    pub max_messages: u32,
    pub window: Duration,
}

impl Default for WsRateLimit {
    fn default() -> Self {
        Self {
            max_messages: 30,
            window: Duration::from_secs(1),
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared store and cross-process fan-out. Memory-only when unset.
    pub redis_url: Option<String>,
    pub router: RouterConfig,
    pub ws_rate_limit: WsRateLimit,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            redis_url: None,
            router: RouterConfig::default(),
            ws_rate_limit: WsRateLimit::default(),
        }
    }
}

#[derive(Debug, Error)]
enum InvalidValue {
    #[error(transparent)]
    Parse(#[from] ParseIntError),
    #[error("must be greater than zero")]
    Zero,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables
    /// fall back to defaults; malformed ones are configuration errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let port = match var("BACKEND_PORT") {
            Some(raw) => parse::<u16>("BACKEND_PORT", &raw)?,
            None => defaults.port,
        };
        let grace_secs = parse_or("RECONNECT_GRACE_SECS", var("RECONNECT_GRACE_SECS"), 60u64)?;
        let kick_secs = parse_or("KICK_VOTE_TIMEOUT_SECS", var("KICK_VOTE_TIMEOUT_SECS"), 30u64)?;
        let max_messages = parse_or(
            "WS_MAX_MESSAGES_PER_WINDOW",
            var("WS_MAX_MESSAGES_PER_WINDOW"),
            defaults.ws_rate_limit.max_messages,
        )?;
        let window_ms = parse_or("WS_RATE_WINDOW_MS", var("WS_RATE_WINDOW_MS"), 1_000u64)?;

        Ok(Self {
            host: var("BACKEND_HOST").unwrap_or(defaults.host),
            port,
            redis_url: var("REDIS_URL"),
            router: RouterConfig {
                reconnect_grace: Duration::from_secs(grace_secs),
                kick_vote_timeout: Duration::from_secs(kick_secs),
            },
            ws_rate_limit: WsRateLimit {
                max_messages,
                window: Duration::from_millis(window_ms),
            },
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr<Err = ParseIntError> + Default + PartialEq,
{
    let value = raw
        .parse::<T>()
        .map_err(InvalidValue::from)
        .and_then(|value| {
            if value == T::default() {
                Err(InvalidValue::Zero)
            } else {
                Ok(value)
            }
        })
        .map_err(|err| AppError::config(format!("{key} is invalid ({raw:?}): {err}"), err))?;
    Ok(value)
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError>
where
    T: FromStr<Err = ParseIntError> + Default + PartialEq,
{
    raw.map_or(Ok(default), |raw| parse(key, &raw))
}
