//! Convenience constructors for the signaling server.

use crate::config::ServerConfig;
use crate::server::SignalServer;
use std::net::SocketAddr;

/// Creates a server bound to the given address with default configuration.
pub fn create_server(bind_address: SocketAddr) -> SignalServer {
    let config = ServerConfig {
        bind_address,
        ..ServerConfig::default()
    };
    SignalServer::new(config)
}

/// Creates a server with a full custom configuration.
pub fn create_server_with_config(config: ServerConfig) -> SignalServer {
    SignalServer::new(config)
}
