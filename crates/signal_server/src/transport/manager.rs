//! Socket tracking and raw outbound delivery.
//!
//! The [`SocketManager`] owns the write half of every accepted WebSocket
//! and maps each one to its assigned easyrtcid. State-layer code never
//! touches it directly; it reaches sockets through the
//! [`signal_events::ClientSender`] implementation in
//! [`crate::transport::response`].

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// One registered socket.
struct SocketHandle {
    /// Write half of the WebSocket, shared with in-flight sends.
    sink: Arc<Mutex<WsSink>>,
    /// Peer address, kept for logging.
    remote_addr: SocketAddr,
}

impl std::fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketHandle")
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

/// Registry of open sockets keyed by easyrtcid.
#[derive(Debug, Default)]
pub struct SocketManager {
    sockets: RwLock<HashMap<String, SocketHandle>>,
}

impl SocketManager {
    /// Creates an empty socket registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a socket's write half under its easyrtcid.
    pub async fn register(&self, easyrtcid: &str, sink: Arc<Mutex<WsSink>>, remote_addr: SocketAddr) {
        self.sockets.write().await.insert(
            easyrtcid.to_string(),
            SocketHandle { sink, remote_addr },
        );
        debug!("🔗 Socket registered: '{}' from {}", easyrtcid, remote_addr);
    }

    /// Removes a socket from the registry.
    pub async fn remove(&self, easyrtcid: &str) {
        if self.sockets.write().await.remove(easyrtcid).is_some() {
            debug!("🔌 Socket removed: '{}'", easyrtcid);
        }
    }

    /// Returns true when a socket is registered for the easyrtcid.
    pub async fn is_active(&self, easyrtcid: &str) -> bool {
        self.sockets.read().await.contains_key(easyrtcid)
    }

    /// Number of registered sockets.
    pub async fn count(&self) -> usize {
        self.sockets.read().await.len()
    }

    /// Sends raw bytes as a text frame to one socket.
    pub async fn send_raw(&self, easyrtcid: &str, data: Vec<u8>) -> Result<(), String> {
        let sink = {
            let sockets = self.sockets.read().await;
            match sockets.get(easyrtcid) {
                Some(handle) => handle.sink.clone(),
                None => return Err(format!("No socket for '{easyrtcid}'")),
            }
        };
        let text = String::from_utf8(data).map_err(|e| format!("Invalid UTF-8 payload: {e}"))?;
        let mut sink = sink.lock().await;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| format!("WebSocket send failed: {e}"))
    }

    /// Closes a socket with an optional reason and drops it from the
    /// registry.
    pub async fn kick(&self, easyrtcid: &str, reason: Option<String>) -> Result<(), String> {
        let handle = self.sockets.write().await.remove(easyrtcid);
        let Some(handle) = handle else {
            return Err(format!("No socket for '{easyrtcid}'"));
        };
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: reason.unwrap_or_default().into(),
        };
        let mut sink = handle.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            warn!("Close frame to '{}' failed: {}", easyrtcid, e);
        }
        debug!("👢 Socket kicked: '{}'", easyrtcid);
        Ok(())
    }
}
