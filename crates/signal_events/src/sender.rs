//! Outbound delivery trait implemented by the transport layer.

use futures::future::BoxFuture;

/// Trait for pushing messages to connected clients.
///
/// Implemented by the server's socket manager and injected into the state
/// registry so that roster-delta emission and message relay never touch the
/// transport directly. Tests substitute a recording implementation.
pub trait ClientSender: Send + Sync + std::fmt::Debug {
    /// Sends raw bytes to the client identified by `easyrtcid`.
    fn send_to_client(&self, easyrtcid: &str, data: Vec<u8>)
        -> BoxFuture<'_, Result<(), String>>;

    /// Checks whether the client's transport connection is still open.
    fn is_connection_active(&self, easyrtcid: &str) -> BoxFuture<'_, bool>;

    /// Forcibly disconnects a client, sending a close frame when the
    /// transport supports one.
    fn kick(&self, easyrtcid: &str, reason: Option<String>)
        -> BoxFuture<'_, Result<(), String>>;
}
