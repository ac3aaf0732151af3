//! Configuration management for the Switchboard signaling server.
//!
//! This module handles loading, validation, and conversion of server
//! configuration from TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use serde_json::json;
use signal_server::ServerConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Application configuration loaded from TOML file.
///
/// Encompasses all server settings: networking, signaling protocol
/// behavior, and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Signaling protocol settings
    #[serde(default)]
    pub signaling: SignalingSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Controls network binding, connection limits, and message size caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Maximum inbound message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Default for connection_timeout
pub fn default_connection_timeout() -> u64 {
    60
}

/// Default for max_connections
fn default_max_connections() -> usize {
    1000
}

/// Default for max_message_size
fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_true() -> bool {
    true
}

fn default_app_name() -> String {
    "default".to_string()
}

/// Signaling protocol behavior settings.
///
/// Each entry maps onto a server-level option applied at startup; anything
/// left at its default matches the built-in option catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingSettings {
    /// Name of the application used when clients name none
    #[serde(default = "default_app_name")]
    pub default_application: String,
    /// Name of the room clients land in when they request none
    #[serde(default = "default_app_name")]
    pub default_room: String,
    /// Whether unknown applications are created on first authentication
    #[serde(default = "default_true")]
    pub auto_create_applications: bool,
    /// Whether unknown rooms are created on first join
    #[serde(default = "default_true")]
    pub auto_create_rooms: bool,
    /// Whether clients requesting no room are placed in the default room
    #[serde(default = "default_true")]
    pub default_room_enable: bool,
    /// Whether sessions are tracked for authenticated connections
    #[serde(default = "default_true")]
    pub session_enable: bool,
    /// ICE servers handed to clients for NAT traversal
    #[serde(default)]
    pub ice_servers: Vec<IceServerSettings>,
}

impl Default for SignalingSettings {
    fn default() -> Self {
        Self {
            default_application: default_app_name(),
            default_room: default_app_name(),
            auto_create_applications: true,
            auto_create_rooms: true,
            default_room_enable: true,
            session_enable: true,
            ice_servers: Vec::new(),
        }
    }
}

/// One ICE server entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerSettings {
    /// STUN or TURN URL (e.g., "stun:stun.l.google.com:19302")
    pub urls: String,
    /// TURN username, when required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential, when required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    pub file_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                max_connections: default_max_connections(),
                connection_timeout: default_connection_timeout(),
                max_message_size: default_max_message_size(),
            },
            signaling: SignalingSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
                file_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at
    /// the specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to a signaling server
    /// configuration, translating the signaling settings into option
    /// overrides.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut option_overrides = HashMap::new();
        option_overrides.insert(
            "appDefaultName".to_string(),
            json!(self.signaling.default_application),
        );
        option_overrides.insert(
            "roomDefaultName".to_string(),
            json!(self.signaling.default_room),
        );
        option_overrides.insert(
            "appAutoCreateEnable".to_string(),
            json!(self.signaling.auto_create_applications),
        );
        option_overrides.insert(
            "roomAutoCreateEnable".to_string(),
            json!(self.signaling.auto_create_rooms),
        );
        option_overrides.insert(
            "roomDefaultEnable".to_string(),
            json!(self.signaling.default_room_enable),
        );
        option_overrides.insert(
            "sessionEnable".to_string(),
            json!(self.signaling.session_enable),
        );
        if !self.signaling.ice_servers.is_empty() {
            option_overrides.insert(
                "appIceServers".to_string(),
                serde_json::to_value(&self.signaling.ice_servers)?,
            );
        }

        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            connection_timeout: self.server.connection_timeout,
            max_message_size: self.server.max_message_size,
            option_overrides,
        })
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }
        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }
        if self.server.max_message_size == 0 {
            return Err("server.max_message_size must be greater than 0".to_string());
        }
        if self.signaling.default_application.is_empty() {
            return Err("signaling.default_application cannot be empty".to_string());
        }
        if self.signaling.default_room.is_empty() {
            return Err("signaling.default_room cannot be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.connection_timeout, 60);
        assert!(config.signaling.session_enable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());

        config.server.bind_address = "127.0.0.1:8080".to_string();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "info".to_string();
        config.signaling.default_room = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_server_config_translates_options() {
        let mut config = AppConfig::default();
        config.signaling.default_room = "lounge".to_string();
        config.signaling.auto_create_rooms = false;
        config.signaling.ice_servers = vec![IceServerSettings {
            urls: "turn:turn.example.com".to_string(),
            username: Some("user".to_string()),
            credential: Some("secret".to_string()),
        }];

        let server_config = config.to_server_config().unwrap();
        assert_eq!(server_config.max_connections, 1000);
        assert_eq!(
            server_config.option_overrides["roomDefaultName"],
            json!("lounge")
        );
        assert_eq!(
            server_config.option_overrides["roomAutoCreateEnable"],
            json!(false)
        );
        assert_eq!(
            server_config.option_overrides["appIceServers"][0]["urls"],
            json!("turn:turn.example.com")
        );
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let file = NamedTempFile::new().unwrap();
        let config = AppConfig::default();
        let content = toml::to_string_pretty(&config).unwrap();
        tokio::fs::write(file.path(), content).await.unwrap();

        let loaded = AppConfig::load_from_file(&file.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(loaded.server.max_connections, 1000);
    }
}
