//! TOML configuration.
//!
//! ```toml
//! [network]
//! ip = "127.0.0.1"
//! port = 9000
//!
//! [reconnect]
//! max_attempts = 5
//! base_delay_ms = 100
//! ```
//!
//! Only `[network]` is required.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Feed endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    /// Per-attempt connect timeout; blocking connect when absent
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Retry ceiling before the receive loop gives up
    pub max_attempts: u32,
    /// Delay after failed attempt `k` is `base_delay_ms * 2^k`
    pub base_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Count sequence gaps and regressions
    pub detect_gaps: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Resting orders pre-reserved per book side
    pub order_capacity: usize,
    /// Pin the consumer thread to the last core
    pub pin_core: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_capacity: 100_000,
            pin_core: false,
        }
    }
}

impl Config {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = content.parse()?;
        info!(path = %path.display(), ip = %config.network.ip, port = config.network.port, "loaded configuration");
        Ok(config)
    }

    /// Build a configuration for an endpoint with every other table defaulted.
    pub fn for_endpoint(ip: impl Into<String>, port: u16) -> Self {
        Self {
            network: NetworkConfig {
                ip: ip.into(),
                port,
                connect_timeout_ms: None,
            },
            reconnect: ReconnectConfig::default(),
            feed: FeedConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.ip.trim().is_empty() {
            return Err(ConfigError::Invalid("network.ip is empty".into()));
        }
        if self.network.port == 0 {
            return Err(ConfigError::Invalid("network.port must be non-zero".into()));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn market_ip(&self) -> &str {
        &self.network.ip
    }

    #[inline]
    pub fn market_port(&self) -> u16 {
        self.network.port
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.network.connect_timeout_ms.map(Duration::from_millis)
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = "[network]\nip = \"10.0.0.1\"\nport = 9000\n".parse().unwrap();

        assert_eq!(config.market_ip(), "10.0.0.1");
        assert_eq!(config.market_port(), 9000);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay_ms, 100);
        assert!(!config.feed.detect_gaps);
        assert_eq!(config.engine.order_capacity, 100_000);
        assert_eq!(config.connect_timeout(), None);
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            [network]
            ip = "127.0.0.1"
            port = 7000
            connect_timeout_ms = 250

            [reconnect]
            max_attempts = 3

            [feed]
            detect_gaps = true

            [engine]
            pin_core = true
        "#;
        let config: Config = text.parse().unwrap();

        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.base_delay_ms, 100);
        assert!(config.feed.detect_gaps);
        assert!(config.engine.pin_core);
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let empty_ip = "[network]\nip = \"\"\nport = 9000\n".parse::<Config>();
        assert!(matches!(empty_ip, Err(ConfigError::Invalid(_))));

        let zero_port = "[network]\nip = \"1.2.3.4\"\nport = 0\n".parse::<Config>();
        assert!(matches!(zero_port, Err(ConfigError::Invalid(_))));

        let zero_retries =
            "[network]\nip = \"1.2.3.4\"\nport = 1\n[reconnect]\nmax_attempts = 0\n".parse::<Config>();
        assert!(matches!(zero_retries, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_shipped_config_parses() {
        let config: Config = include_str!("../config/quick-lob.toml").parse().unwrap();
        assert_eq!(config.market_port(), 9000);
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_missing_network_is_parse_error() {
        assert!(matches!("".parse::<Config>(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network]\nip = \"127.0.0.1\"\nport = 9100").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.market_port(), 9100);

        let missing = Config::load(Path::new("/nonexistent/quick-lob.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
