//! WebRTC signaling server core.
//!
//! This crate implements the coordination layer WebRTC peers need before
//! they can talk directly: authentication into isolated applications,
//! room membership with delta-based roster synchronization, relay of SDP
//! offers/answers and ICE candidates, and targeted application messaging
//! over rooms and groups.
//!
//! All protocol behavior is dispatched through a single-listener event bus
//! ([`signal_events::EventBus`]) so an embedding application can override
//! any piece of it and restore the default later.

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod state;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;

pub use config::ServerConfig;
pub use error::{Severity, SignalError, SignalResult};
pub use protocol::router::{
    EventPayload, Router, EVENT_AUTH, EVENT_AUTHENTICATE, EVENT_AUTHENTICATED, EVENT_CMD,
    EVENT_CONNECTION, EVENT_DISCONNECT, EVENT_MSG, EVENT_STARTUP,
};
pub use protocol::types::{ClientEnvelope, ClientPresence, OutboundEnvelope};
pub use server::SignalServer;
pub use state::{Application, ClientConnection, ConnectionRoom, Group, Room, ServerState, Session};
pub use transport::{SignalResponseSender, SocketManager};
pub use utils::{create_server, create_server_with_config};
