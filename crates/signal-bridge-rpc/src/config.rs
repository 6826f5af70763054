//! Client configuration.
//!
//! Loaded from `config.json` in the platform config directory
//! (`~/.config/signal-bridge/config.json` on Linux). Every field is optional:
//!
//! ```json
//! {
//!   "address": { "host": "localhost", "port": 7583 },
//!   "reconnectDelayMs": 100,
//!   "connectTimeoutMs": 5000,
//!   "notificationCapacity": 64
//! }
//! ```
//!
//! `address` may also be a plain string holding a Unix socket path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::connector::DaemonAddress;
use crate::error::ConfigError;

fn default_reconnect_delay_ms() -> u64 {
    100
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_notification_capacity() -> usize {
    64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Daemon address; the default socket path when unset.
    #[serde(default)]
    pub address: Option<DaemonAddress>,

    /// Fixed delay between reconnect attempts after a connection loss.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound on a single connect attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Buffered notifications per subscriber before the oldest are dropped.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl ClientConfig {
    /// Default config file location, if the platform has a config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "signal-bridge").map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load config from file, returning defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(address) = &self.address {
            address.validate()?;
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnectDelayMs must be greater than 0".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connectTimeoutMs must be greater than 0".into(),
            ));
        }
        if self.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notificationCapacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// The configured address, or the default socket path.
    #[must_use]
    pub fn address(&self) -> DaemonAddress {
        self.address.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert!(config.address.is_none());
        assert_eq!(config.reconnect_delay(), Duration::from_millis(100));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.notification_capacity, 64);
        assert_eq!(config.address(), DaemonAddress::default());
    }

    #[test]
    fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/nonexistent/path/config.json");
        let config = ClientConfig::load(path).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_config_load_tcp_address() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"address": {{"host": "localhost", "port": 7583}}, "reconnectDelayMs": 250}}"#
        )
        .unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.address(), DaemonAddress::tcp("localhost", 7583));
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(config.connect_timeout_ms, 5000);
    }

    #[test]
    fn test_config_load_socket_address() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"address": "/tmp/signal-cli/socket"}}"#).unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.address(), DaemonAddress::unix("/tmp/signal-cli/socket"));
    }

    #[test]
    fn test_config_load_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{invalid json}}").unwrap();

        let result = ClientConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_config_load_rejects_zero_port() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"address": {{"host": "localhost", "port": 0}}}}"#).unwrap();

        let result = ClientConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let config = ClientConfig {
            reconnect_delay_ms: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            notification_capacity: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_path_file_name() {
        if let Some(path) = ClientConfig::default_path() {
            assert!(path.ends_with("signal-bridge/config.json"));
        }
    }
}
