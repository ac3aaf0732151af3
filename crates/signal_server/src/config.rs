//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the signaling server behavior.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Configuration structure for the signaling server.
///
/// Contains all necessary parameters to configure server behavior including
/// network settings, connection limits, and option overrides applied to the
/// state registry at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Connection timeout in seconds
    pub connection_timeout: u64,

    /// Maximum inbound message size in bytes
    pub max_message_size: usize,

    /// Server-level option overrides applied at startup, keyed by option
    /// name from the closed option catalog
    #[serde(default)]
    pub option_overrides: HashMap<String, Value>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080"
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080))),
            max_connections: 1000,
            connection_timeout: 60,
            max_message_size: 64 * 1024,
            option_overrides: HashMap::new(),
        }
    }
}
