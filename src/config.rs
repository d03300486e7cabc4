//! Registry Configuration
//!
//! Defines the configuration for the character registry including:
//! - Sudo users (identities allowed to mutate the catalog)
//! - Record/sequence database location
//! - Display channel (Telegram bot token and channel)
//! - Image URL probing
//! - Admin HTTP server binding
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Complete registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Identities allowed to upload, update and delete characters
    pub sudo_users: Vec<String>,
    pub storage: StorageConfig,
    pub display: DisplayConfig,
    pub probe: ProbeConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding characters and sequence counters
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/registry.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Bot API base URL
    pub api_url: String,
    pub bot_token: String,
    /// Channel the character posts go to
    pub channel_id: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.telegram.org".to_string(),
            bot_token: String::new(),
            channel_id: String::new(),
        }
    }
}

impl DisplayConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.channel_id.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Check image URLs with a HEAD request before uploading
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl RegistryConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!("Loaded config from {:?}", path);
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override values from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(users) = lookup("SUDO_USERS") {
            self.sudo_users = users
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect();
            debug!("SUDO_USERS override: {} identities", self.sudo_users.len());
        }
        if let Some(token) = lookup("BOT_TOKEN") {
            self.display.bot_token = token;
        }
        if let Some(channel) = lookup("CHARA_CHANNEL_ID") {
            self.display.channel_id = channel;
        }
        if let Some(url) = lookup("TELEGRAM_API_URL") {
            self.display.api_url = url;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(port) = lookup("REGISTRY_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "REGISTRY_PORT",
                value: port.clone(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert!(config.sudo_users.is_empty());
        assert_eq!(config.display.api_url, "https://api.telegram.org");
        assert!(!config.display.is_configured());
        assert!(config.probe.enabled);
        assert_eq!(config.probe.timeout(), Duration::from_secs(10));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_partial_toml() {
        let config = RegistryConfig::from_toml(
            r#"
            sudo_users = ["1", "2"]

            [display]
            bot_token = "abc"
            channel_id = "-1001"

            [probe]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.sudo_users, vec!["1", "2"]);
        assert!(config.display.is_configured());
        assert_eq!(config.display.api_url, "https://api.telegram.org");
        assert!(!config.probe.enabled);
        assert_eq!(config.probe.timeout_secs, 10);
        assert_eq!(
            config.storage.database_path,
            PathBuf::from("data/registry.db")
        );
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            RegistryConfig::from_toml("sudo_users = 5"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("SUDO_USERS", "10, 20,,30"),
            ("CHARA_CHANNEL_ID", "-100"),
            ("REGISTRY_PORT", "9000"),
        ]
        .into_iter()
        .collect();

        let mut config = RegistryConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.sudo_users, vec!["10", "20", "30"]);
        assert_eq!(config.display.channel_id, "-100");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = RegistryConfig::default();
        let err = config
            .apply_overrides(|k| (k == "REGISTRY_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "REGISTRY_PORT", .. }));
    }

    #[test]
    #[serial]
    fn test_load_file_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        std::fs::write(&path, "sudo_users = [\"1\"]\n[display]\nbot_token = \"file\"\n").unwrap();

        std::env::set_var("BOT_TOKEN", "env-token");
        let config = RegistryConfig::load(Some(&path));
        std::env::remove_var("BOT_TOKEN");

        let config = config.unwrap();
        assert_eq!(config.sudo_users, vec!["1"]);
        assert_eq!(config.display.bot_token, "env-token");
    }

    #[test]
    #[serial]
    fn test_load_missing_file() {
        let err = RegistryConfig::load(Some(Path::new("/nonexistent/registry.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
