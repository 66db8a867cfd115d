//! Session configuration.
//!
//! Defaults match the worker's fixed ports. Environment variables override
//! defaults; the binary applies command-line flags on top.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::poll::DEFAULT_POLL_INTERVAL;

pub const DEFAULT_WORKER_PORT: u16 = 3000;
pub const DEFAULT_RECEIVE_PORT: u16 = 3001;
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

pub const ENV_WORKER_PORT: &str = "PYDE_WORKER_PORT";
pub const ENV_RECEIVE_PORT: &str = "PYDE_RECEIVE_PORT";
pub const ENV_HOST: &str = "PYDE_HOST";
pub const ENV_POLL_INTERVAL_MS: &str = "PYDE_POLL_INTERVAL_MS";
pub const ENV_WORKER_CMD: &str = "PYDE_WORKER_CMD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {name} value {value:?}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(name: impl Into<String>, value: impl Into<String>, reason: impl ToString) -> Self {
        Self::Invalid {
            name: name.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: IpAddr,
    /// Port the worker listens on.
    pub worker_port: u16,
    /// Port this console listens on.
    pub receive_port: u16,
    pub poll_interval: Duration,
    /// Program and arguments to launch the worker. `None` means it is already running.
    pub worker_command: Option<Vec<String>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            worker_port: DEFAULT_WORKER_PORT,
            receive_port: DEFAULT_RECEIVE_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker_command: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `PYDE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup(ENV_HOST) {
            config.host = parse_value(ENV_HOST, &v)?;
        }
        if let Some(v) = lookup(ENV_WORKER_PORT) {
            config.worker_port = parse_value(ENV_WORKER_PORT, &v)?;
        }
        if let Some(v) = lookup(ENV_RECEIVE_PORT) {
            config.receive_port = parse_value(ENV_RECEIVE_PORT, &v)?;
        }
        if let Some(v) = lookup(ENV_POLL_INTERVAL_MS) {
            config.poll_interval = parse_poll_interval(ENV_POLL_INTERVAL_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_WORKER_CMD) {
            config.worker_command = parse_command(ENV_WORKER_CMD, &v)?;
        }

        Ok(config)
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_worker_port(mut self, port: u16) -> Self {
        self.worker_port = port;
        self
    }

    pub fn with_receive_port(mut self, port: u16) -> Self {
        self.receive_port = port;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_worker_command(mut self, command: Vec<String>) -> Self {
        self.worker_command = Some(command);
        self
    }
}

pub fn parse_value<V>(name: &str, value: &str) -> Result<V, ConfigError>
where
    V: std::str::FromStr,
    V::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(name, value, e))
}

pub fn parse_poll_interval(name: &str, value: &str) -> Result<Duration, ConfigError> {
    let millis: u64 = parse_value(name, value)?;
    if millis == 0 {
        return Err(ConfigError::invalid(name, value, "must be at least 1 ms"));
    }
    Ok(Duration::from_millis(millis))
}

fn parse_command(name: &str, value: &str) -> Result<Option<Vec<String>>, ConfigError> {
    let parts: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(ConfigError::invalid(name, value, "command is empty"));
    }
    Ok(Some(parts))
}
