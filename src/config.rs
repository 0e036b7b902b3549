use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dirs;
use crate::error::{Error, Result};

/// User-configurable settings for the agentdeck server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address for the HTTP server (default: 127.0.0.1, loopback only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the HTTP server (default: 5210)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base directory for persisted state (projects.json, providers.json)
    #[serde(default = "dirs::deck_home")]
    pub data_dir: PathBuf,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5210
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: dirs::deck_home(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the default config file path, then apply the
    /// `PORT` environment variable on top. Returns defaults if no file exists.
    pub fn load() -> Result<Self> {
        let path = dirs::config_path();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
            })?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))?
        } else {
            Self::default()
        };

        if let Ok(port) = std::env::var("PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid PORT value: {port}")))?;
        }

        Ok(config)
    }

    /// Returns the server bind address string (e.g., "127.0.0.1:5210").
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5210);
    }

    #[test]
    fn test_bind_address() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:5210");
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: ServerConfig = toml::from_str("port = 9110").unwrap();
        assert_eq!(config.port, 9110);
        assert_eq!(config.host, "127.0.0.1");
    }
}
