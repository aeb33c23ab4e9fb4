use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::backoff::ReconnectPolicy;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub login: LoginConfig,
    pub api: ApiConfig,
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Ok(toml::from_str::<Self>(&config_str)?)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_pong_timeout() -> Option<u64> {
    Some(60)
}

#[derive(Clone, Debug, Deserialize)]
pub struct RealtimeConfig {
    pub endpoint: String,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64, // in seconds
    /// `None` disables the pong deadline entirely.
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout: Option<u64>, // in seconds
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl RealtimeConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    pub fn pong_deadline(&self) -> Option<Duration> {
        self.pong_timeout.map(Duration::from_secs)
    }
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_max_attempts() -> u32 {
    10
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            max_attempts: self.max_attempts,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_poll_interval() -> u64 {
    2
}

fn default_login_timeout() -> u64 {
    600
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64, // in seconds
    #[serde(default = "default_login_timeout")]
    pub timeout: u64, // in seconds
}

impl LoginConfig {
    pub fn poll_every(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            timeout: default_login_timeout(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use crate::config::Config;

    #[test]
    fn test_simple_config() {
        let config_contents = r#"
[realtime]
endpoint = "wss://ops.example.net/realtime"
heartbeat_interval = 30

[realtime.reconnect]
base_delay_ms = 1000
max_delay_ms = 10000
multiplier = 1.5
max_attempts = 5

[login]
poll_interval = 2
timeout = 600

[api]
base_url = "https://ops.example.net/api"
bearer_token = "secret-token"
        "#;

        let config: Config = toml::from_str(config_contents).unwrap();

        assert_eq!(config.realtime.endpoint, "wss://ops.example.net/realtime");
        assert_eq!(config.realtime.heartbeat_interval, 30);
        assert_eq!(config.realtime.pong_timeout, Some(60));
        assert_eq!(config.realtime.reconnect.base_delay_ms, 1000);
        assert_eq!(config.realtime.reconnect.max_delay_ms, 10000);
        assert_eq!(config.realtime.reconnect.multiplier, 1.5);
        assert_eq!(config.realtime.reconnect.max_attempts, 5);
        assert_eq!(config.login.poll_interval, 2);
        assert_eq!(config.login.timeout, 600);
        assert_eq!(config.api.base_url, "https://ops.example.net/api");
        assert_eq!(config.api.bearer_token.as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_defaults_fill_in_missing_sections() {
        let config_contents = r#"
[realtime]
endpoint = "ws://localhost:8080/realtime"

[api]
base_url = "http://localhost:8080"
        "#;

        let config: Config = toml::from_str(config_contents).unwrap();

        assert_eq!(config.realtime.heartbeat_interval, 30);
        assert_eq!(config.realtime.reconnect.max_attempts, 10);
        assert_eq!(config.login.poll_interval, 2);
        assert_eq!(config.login.timeout, 600);
        assert!(config.api.bearer_token.is_none());
    }
}
