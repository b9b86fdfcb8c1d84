use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use netplay_shared::config::{self, ConfigError};
use netplay_shared::DEFAULT_SERVER_PORT;
use serde::{Deserialize, Serialize};

/// Console limit applied in test mode when none is configured.
pub const TEST_MODE_MAX_CONSOLES: usize = 10;

/// File name looked up below the platform config directory.
pub const SERVER_CONFIG_FILE: &str = "server.toml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    /// Enables `ShutDownServer` and the default console limit.
    pub test_mode: bool,
    pub max_consoles: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_SERVER_PORT,
            test_mode: false,
            max_consoles: None,
        }
    }
}

impl ServerConfig {
    /// Loopback on an ephemeral port, test mode on.
    pub fn local_test() -> Self {
        ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            test_mode: true,
            max_consoles: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        config::load_toml_or_default(path)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn effective_max_consoles(&self) -> Option<usize> {
        match self.max_consoles {
            Some(max) => Some(max),
            None if self.test_mode => Some(TEST_MODE_MAX_CONSOLES),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 10001);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:10001");
        assert_eq!(config.effective_max_consoles(), None);
    }

    #[test]
    fn test_test_mode_limits_consoles() {
        let mut config = ServerConfig::local_test();
        assert_eq!(config.effective_max_consoles(), Some(10));
        config.max_consoles = Some(3);
        assert_eq!(config.effective_max_consoles(), Some(3));
    }

    #[test]
    fn test_partial_toml() {
        let config: ServerConfig = toml::from_str("port = 9000\ntest_mode = true").unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.test_mode);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}
