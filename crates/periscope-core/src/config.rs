//! Server and bridge configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! [server]
//! port = 5959
//! read_timeout_ms = 10000
//!
//! [bridge]
//! max_pending_results = 100
//! publish_interval_secs = 5.0
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Default listening port
pub const DEFAULT_PORT: u16 = 5959;

/// Hard cap on request head bytes
pub const MAX_HEAD_BYTES: usize = 8 * 1024;

const MIN_HEAD_BYTES: usize = 1024;

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Loopback port; 0 picks an ephemeral port
    pub port: u16,
    /// Per-connection socket read/write timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Request head byte cap, clamped to 1 KiB..=8 KiB
    pub max_head_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            read_timeout_ms: 10_000,
            max_head_bytes: MAX_HEAD_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn max_head_bytes(mut self, bytes: usize) -> Self {
        self.max_head_bytes = bytes;
        self
    }

    /// Socket timeout as a `Duration` (at least 1 ms; sockets reject zero)
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    /// Head cap; never above [`MAX_HEAD_BYTES`]
    pub fn head_limit(&self) -> usize {
        self.max_head_bytes.clamp(MIN_HEAD_BYTES, MAX_HEAD_BYTES)
    }
}

/// Command/snapshot bridge configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Uncollected results tolerated before the store is cleared
    pub max_pending_results: usize,
    /// Minimum seconds between snapshot publishes
    pub publish_interval_secs: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_pending_results: 100,
            publish_interval_secs: 5.0,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_pending_results(mut self, max: usize) -> Self {
        self.max_pending_results = max;
        self
    }

    pub fn publish_interval(mut self, interval: Duration) -> Self {
        self.publish_interval_secs = interval.as_secs_f64();
        self
    }

    /// Publish interval as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.publish_interval_secs).unwrap_or(Duration::ZERO)
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PeriscopeConfig {
    pub server: ServerConfig,
    pub bridge: BridgeConfig,
}

impl PeriscopeConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        if !config.bridge.publish_interval_secs.is_finite() || config.bridge.publish_interval_secs < 0.0 {
            return Err(Error::Config(format!(
                "publish_interval_secs must be a non-negative number, got {}",
                config.bridge.publish_interval_secs
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PeriscopeConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.timeout(), Duration::from_secs(10));
        assert_eq!(config.server.head_limit(), 8192);
        assert_eq!(config.bridge.max_pending_results, 100);
        assert_eq!(config.bridge.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_toml() {
        let config = PeriscopeConfig::from_toml_str(
            r#"
            [server]
            port = 8088

            [bridge]
            publish_interval_secs = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.read_timeout_ms, 10_000);
        assert_eq!(config.bridge.interval(), Duration::from_millis(500));
        assert_eq!(config.bridge.max_pending_results, 100);
    }

    #[test]
    fn test_empty_toml() {
        let config = PeriscopeConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            PeriscopeConfig::from_toml_str("[server]\nport = \"high\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            PeriscopeConfig::from_toml_str("[bridge]\npublish_interval_secs = -1.0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_head_limit_clamped() {
        let config = ServerConfig::new(0).max_head_bytes(10);
        assert_eq!(config.head_limit(), 1024);

        let config = ServerConfig::new(0).max_head_bytes(4096);
        assert_eq!(config.head_limit(), 4096);

        let config = PeriscopeConfig::from_toml_str("[server]\nmax_head_bytes = 1000000").unwrap();
        assert_eq!(config.server.head_limit(), MAX_HEAD_BYTES);
    }

    #[test]
    fn test_sub_second_timeout() {
        let config = ServerConfig::new(0).read_timeout(Duration::from_millis(200));
        assert_eq!(config.timeout(), Duration::from_millis(200));

        let config = PeriscopeConfig::from_toml_str("[server]\nread_timeout_ms = 250").unwrap();
        assert_eq!(config.server.timeout(), Duration::from_millis(250));

        let config = ServerConfig::new(0).read_timeout(Duration::ZERO);
        assert_eq!(config.timeout(), Duration::from_millis(1));
    }
}
