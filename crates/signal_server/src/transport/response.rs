//! [`ClientSender`] implementation backed by the socket registry.

use crate::transport::manager::SocketManager;
use signal_events::ClientSender;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Bridges state-layer delivery calls onto live WebSockets.
#[derive(Debug, Clone)]
pub struct SignalResponseSender {
    sockets: Arc<SocketManager>,
}

impl SignalResponseSender {
    /// Creates a sender over the given socket registry.
    pub fn new(sockets: Arc<SocketManager>) -> Self {
        Self { sockets }
    }
}

impl ClientSender for SignalResponseSender {
    fn send_to_client(
        &self,
        easyrtcid: &str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        let easyrtcid = easyrtcid.to_string();
        Box::pin(async move { self.sockets.send_raw(&easyrtcid, data).await })
    }

    fn is_connection_active(
        &self,
        easyrtcid: &str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        let easyrtcid = easyrtcid.to_string();
        Box::pin(async move { self.sockets.is_active(&easyrtcid).await })
    }

    fn kick(
        &self,
        easyrtcid: &str,
        reason: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        let easyrtcid = easyrtcid.to_string();
        Box::pin(async move { self.sockets.kick(&easyrtcid, reason).await })
    }
}
