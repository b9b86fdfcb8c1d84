//! Konfigurationsstrukturen für den Netplay-Client.

use std::path::Path;

use netplay_shared::config::{self, ConfigError};
use netplay_shared::proto::Port;
use netplay_shared::DEFAULT_SERVER_PORT;
use serde::{Deserialize, Serialize};

/// File name looked up below the platform config directory.
pub const CLIENT_CONFIG_FILE: &str = "client.toml";

/// A port request as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRequest {
    Port1,
    Port2,
    Port3,
    Port4,
    Any,
}

impl From<PortRequest> for Port {
    fn from(request: PortRequest) -> Self {
        match request {
            PortRequest::Port1 => Port::Port1,
            PortRequest::Port2 => Port::Port2,
            PortRequest::Port3 => Port::Port3,
            PortRequest::Port4 => Port::Port4,
            PortRequest::Any => Port::PortAny,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub enabled: bool,
    pub server_hostname: String,
    pub server_port: u16,
    /// Join this console; `None` creates a new one.
    pub console_id: Option<i64>,
    pub delay_frames: i32,
    pub requested_ports: Vec<PortRequest>,
    pub rom_file_md5: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_hostname: "localhost".into(),
            server_port: DEFAULT_SERVER_PORT,
            console_id: None,
            delay_frames: 2,
            requested_ports: vec![PortRequest::Any],
            rom_file_md5: String::new(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        config::load_toml_or_default(path)
    }

    pub fn requested_ports(&self) -> Vec<Port> {
        self.requested_ports.iter().copied().map(Port::from).collect()
    }
}
