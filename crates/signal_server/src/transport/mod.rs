//! WebSocket transport: socket registry and outbound bridge.

pub mod manager;
pub mod response;

pub use manager::SocketManager;
pub use response::SignalResponseSender;
