//! Gemeinsame Helfer zum Laden der TOML-Konfiguration.
//!
//! Server and client tools keep their own config structs; this module only
//! knows where config files live and how to read them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Directory name below the platform config dir.
pub const CONFIG_DIR_NAME: &str = "netplay";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// `<config dir>/netplay/<file_name>`, e.g. `~/.config/netplay/server.toml`.
pub fn default_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(file_name))
}

/// Parses a TOML document. Missing keys fall back to the struct's serde defaults.
pub fn parse_toml<T: DeserializeOwned>(content: &str, origin: &Path) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })
}

/// Reads `path` and parses it as TOML.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml(&content, path)
}

/// Like [`load_toml`], but a missing file yields `T::default()`.
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(T::default());
    }
    load_toml(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        port: u16,
        name: String,
    }

    #[test]
    fn test_parse_toml_uses_defaults_for_missing_keys() {
        let sample: Sample = parse_toml("port = 4000", Path::new("inline")).unwrap();
        assert_eq!(
            sample,
            Sample {
                port: 4000,
                name: String::new()
            }
        );
    }

    #[test]
    fn test_parse_toml_reports_origin() {
        let err = parse_toml::<Sample>("port = \"nope\"", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_missing_file_yields_default() {
        let path = std::env::temp_dir().join("netplay-config-does-not-exist.toml");
        let sample: Sample = load_toml_or_default(&path).unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_load_toml_from_disk() {
        let path = std::env::temp_dir().join(format!("netplay-config-{}.toml", std::process::id()));
        fs::write(&path, "name = \"lan\"\nport = 1").unwrap();
        let sample: Sample = load_toml(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(sample.name, "lan");
        assert_eq!(sample.port, 1);
    }

    #[test]
    fn test_default_config_path_ends_with_file_name() {
        if let Some(path) = default_config_path("server.toml") {
            assert!(path.ends_with("netplay/server.toml"));
        }
    }
}
