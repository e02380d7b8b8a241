use std::time::Duration;

use dataflow_api_client::ApiClient;

use crate::reconnect::{ReconnectPolicy, DEFAULT_RECONNECT_DELAY};
use crate::refresh::DEFAULT_REFRESH_INTERVAL;
use crate::subscription::StreamConfig;

/// Default pull API base for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must not be empty")]
    Empty { var: &'static str },

    #[error("{var} must be a positive integer number of seconds, got '{value}'")]
    InvalidSeconds { var: &'static str, value: String },
}

/// Live-layer configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Pull API base URL.
    pub api_url: String,
    /// Push stream base URL. `http(s)` is mapped to `ws(s)` on connect.
    pub stream_url: String,
    /// Static bearer token for the pull API, if any.
    pub api_token: Option<String>,
    pub reconnect_delay: Duration,
    pub refresh_interval: Duration,
}

impl LiveConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                        |
    /// |----------------------------------|--------------------------------|
    /// | `DATAFLOW_API_URL`               | `http://localhost:8000/api/v1` |
    /// | `DATAFLOW_STREAM_URL`            | value of `DATAFLOW_API_URL`    |
    /// | `DATAFLOW_API_TOKEN`             | unset                          |
    /// | `DATAFLOW_RECONNECT_DELAY_SECS`  | `3`                            |
    /// | `DATAFLOW_REFRESH_INTERVAL_SECS` | `30`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = match lookup("DATAFLOW_API_URL") {
            Some(value) => non_empty("DATAFLOW_API_URL", value)?,
            None => DEFAULT_API_URL.to_string(),
        };

        let stream_url = match lookup("DATAFLOW_STREAM_URL") {
            Some(value) => non_empty("DATAFLOW_STREAM_URL", value)?,
            None => api_url.clone(),
        };

        let api_token = lookup("DATAFLOW_API_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        let reconnect_delay = seconds(
            "DATAFLOW_RECONNECT_DELAY_SECS",
            lookup("DATAFLOW_RECONNECT_DELAY_SECS"),
            DEFAULT_RECONNECT_DELAY,
        )?;
        let refresh_interval = seconds(
            "DATAFLOW_REFRESH_INTERVAL_SECS",
            lookup("DATAFLOW_REFRESH_INTERVAL_SECS"),
            DEFAULT_REFRESH_INTERVAL,
        )?;

        Ok(Self {
            api_url,
            stream_url,
            api_token,
            reconnect_delay,
            refresh_interval,
        })
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.stream_url.clone())
            .with_reconnect(ReconnectPolicy::fixed(self.reconnect_delay))
    }

    pub fn api_client(&self) -> ApiClient {
        let client = ApiClient::new(self.api_url.clone());
        match &self.api_token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        }
    }
}

fn non_empty(var: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Empty { var });
    }
    Ok(trimmed.to_string())
}

fn seconds(
    var: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidSeconds { var, value }),
    }
}
