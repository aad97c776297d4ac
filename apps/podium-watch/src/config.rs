//! Environment-backed runtime configuration for `podium-watch`.

use std::{env, error::Error, fmt};

use url::Url;

use podium_core::DEFAULT_RECONNECT_INTERVAL_MS;

const DEFAULT_API_BASE: &str = "http://localhost:8000/api";
const DEFAULT_STREAM_BASE: &str = "ws://localhost:8000/ws";

/// Runtime configuration used by the watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    /// Request/response API base, e.g. `http://localhost:8000/api`.
    pub api_base: Url,
    /// Streaming endpoint base, e.g. `ws://localhost:8000/ws`.
    pub stream_base: Url,
    /// Competition whose ranking feed is watched.
    pub competition_id: u64,
    /// Whether dropped channels reconnect automatically.
    pub reconnect: bool,
    /// Fixed delay between reconnection attempts.
    pub reconnect_interval_ms: u64,
}

impl WatchConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api_base = parse_url("PODIUM_API_URL", DEFAULT_API_BASE, &mut lookup)?;
        let stream_base = parse_url("PODIUM_WS_URL", DEFAULT_STREAM_BASE, &mut lookup)?;

        let competition_raw = optional_trimmed_env("PODIUM_COMPETITION", &mut lookup)
            .ok_or(ConfigError::MissingValue {
                key: "PODIUM_COMPETITION",
            })?;
        let competition_id =
            competition_raw
                .parse::<u64>()
                .map_err(|err| ConfigError::InvalidValue {
                    key: "PODIUM_COMPETITION",
                    value: competition_raw.clone(),
                    reason: err.to_string(),
                })?;

        let reconnect = parse_optional_bool("PODIUM_RECONNECT", true, &mut lookup)?;
        let reconnect_interval_ms = parse_optional_u64(
            "PODIUM_RECONNECT_INTERVAL_MS",
            DEFAULT_RECONNECT_INTERVAL_MS,
            &mut lookup,
        )?;

        if reconnect_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PODIUM_RECONNECT_INTERVAL_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            api_base,
            stream_base,
            competition_id,
            reconnect,
            reconnect_interval_ms,
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is missing.
    MissingValue { key: &'static str },
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingValue { key } => write!(f, "missing required {key}"),
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_url<F>(key: &'static str, default: &str, lookup: &mut F) -> Result<Url, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let raw = optional_trimmed_env(key, lookup).unwrap_or_else(|| default.to_owned());
    Url::parse(&raw).map_err(|err| ConfigError::InvalidValue {
        key,
        value: raw,
        reason: err.to_string(),
    })
}

fn parse_optional_u64<F>(
    key: &'static str,
    default: u64,
    lookup: &mut F,
) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_optional_bool<F>(
    key: &'static str,
    default: bool,
    lookup: &mut F,
) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean (1/0/true/false/yes/no/on/off)".to_owned(),
        }),
    }
}
