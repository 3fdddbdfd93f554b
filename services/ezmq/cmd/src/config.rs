//! Configuration handling for the ezmq binary.
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables.

use anyhow::Result;
use ezmq_socket::EndpointConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Binary configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EzmqConfig {
    /// Publisher host the subscriber connects to
    pub ip: String,
    /// Port the publisher binds and the subscriber connects to
    pub port: u16,
    /// Endpoint tuning
    pub endpoint: EndpointConfig,
}

impl Default for EzmqConfig {
    fn default() -> Self {
        Self {
            ip: "localhost".to_string(),
            port: 5562,
            endpoint: EndpointConfig::default(),
        }
    }
}

impl EzmqConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<EzmqConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?}, using defaults: {}",
                        config_path.as_ref(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", config_path.as_ref());
                Self::default()
            }
        };

        config.apply_environment_overrides();

        info!(
            "Final ezmq configuration: ip={}, port={}, max_frame_size={}, reconnect_interval={:?}",
            config.ip, config.port, config.endpoint.max_frame_size, config.endpoint.reconnect_interval
        );

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(port) = lookup("EZMQ_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    self.port = port;
                    info!("Port overridden by environment: {}", port);
                }
                Err(_) => warn!("Ignoring invalid EZMQ_PORT {:?}", port),
            }
        }

        if let Some(ip) = lookup("EZMQ_IP") {
            self.ip = ip;
            info!("Publisher address overridden by environment: {}", self.ip);
        }

        if let Some(size) = lookup("EZMQ_MAX_FRAME_SIZE") {
            match size.parse::<usize>() {
                Ok(size) => {
                    self.endpoint.max_frame_size = size;
                    info!("Max frame size overridden by environment: {}", size);
                }
                Err(_) => warn!("Ignoring invalid EZMQ_MAX_FRAME_SIZE {:?}", size),
            }
        }

        if let Some(interval) = lookup("EZMQ_RECONNECT_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => {
                    self.endpoint.reconnect_interval = Duration::from_millis(ms);
                    info!("Reconnect interval overridden by environment: {}ms", ms);
                }
                Err(_) => warn!("Ignoring invalid EZMQ_RECONNECT_INTERVAL_MS {:?}", interval),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = EzmqConfig::default();
        assert_eq!(config.ip, "localhost");
        assert_eq!(config.port, 5562);
        assert_eq!(config.endpoint, EndpointConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
ip: 10.0.0.7
port: 6000
endpoint:
  max_frame_size: 1048576
  reconnect_interval: 250
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = EzmqConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.ip, "10.0.0.7");
        assert_eq!(config.port, 6000);
        assert_eq!(config.endpoint.max_frame_size, 1048576);
        assert_eq!(config.endpoint.reconnect_interval, Duration::from_millis(250));
        assert_eq!(
            config.endpoint.handshake_timeout,
            EndpointConfig::default().handshake_timeout
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EzmqConfig::load_from_file(dir.path().join("absent.yaml")).unwrap();
        // The process environment may carry overrides; compare the file part only
        config.apply_overrides(|_| None);
        assert_eq!(config.endpoint.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("EZMQ_PORT", "7000"),
            ("EZMQ_IP", "broker.local"),
            ("EZMQ_MAX_FRAME_SIZE", "not-a-number"),
            ("EZMQ_RECONNECT_INTERVAL_MS", "20"),
        ]
        .into_iter()
        .collect();

        let mut config = EzmqConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.port, 7000);
        assert_eq!(config.ip, "broker.local");
        assert_eq!(config.endpoint.max_frame_size, EndpointConfig::default().max_frame_size);
        assert_eq!(config.endpoint.reconnect_interval, Duration::from_millis(20));
    }
}
