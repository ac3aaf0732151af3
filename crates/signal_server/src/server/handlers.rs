//! Per-connection WebSocket lifecycle handling.
//!
//! Each accepted socket gets a generated easyrtcid, a registered write
//! half, and a read loop that routes inbound envelopes onto the bus.
//! Channel selection is purely syntactic: `authenticate` goes to the auth
//! topic, known command subtypes to the command topic, anything else with
//! a destination to the application-message topic, and the remainder to
//! the command topic where it is rejected as an unsupported type.

use crate::protocol::codes;
use crate::protocol::router::{EVENT_AUTH, EVENT_CMD, EVENT_CONNECTION, EVENT_DISCONNECT, EVENT_MSG};
use crate::protocol::types::{ClientEnvelope, OutboundEnvelope, COMMAND_MSG_TYPES};
use crate::protocol::EventPayload;
use crate::transport::SocketManager;
use futures_util::StreamExt;
use serde_json::json;
use signal_events::EventBus;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handles one client connection from WebSocket handshake to close.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    sockets: Arc<SocketManager>,
    bus: Arc<EventBus<EventPayload>>,
    max_message_size: usize,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("❌ WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (sink, mut inbound) = ws_stream.split();

    let easyrtcid = Uuid::new_v4().simple().to_string();
    sockets
        .register(&easyrtcid, Arc::new(Mutex::new(sink)), addr)
        .await;
    info!("🔗 New connection '{}' from {}", easyrtcid, addr);

    if let Err(e) = bus
        .emit(EVENT_CONNECTION, EventPayload::lifecycle(&easyrtcid))
        .await
    {
        warn!("Connection event for '{}' failed: {}", easyrtcid, e);
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                send_transport_error(&sockets, &easyrtcid, "SERVER_SHUTDOWN").await;
                let _ = sockets.kick(&easyrtcid, Some("Server shutdown".to_string())).await;
                break;
            }
            message = inbound.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > max_message_size {
                            send_transport_error(&sockets, &easyrtcid, "MSG_REJECT_BAD_SIZE").await;
                            continue;
                        }
                        route_inbound(&bus, &sockets, &easyrtcid, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Connection '{}' closed", easyrtcid);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and control frames carry no protocol data.
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error on '{}': {}", easyrtcid, e);
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = bus
        .emit(EVENT_DISCONNECT, EventPayload::lifecycle(&easyrtcid))
        .await
    {
        warn!("Disconnect event for '{}' failed: {}", easyrtcid, e);
    }
    sockets.remove(&easyrtcid).await;
    info!("🔌 Connection '{}' from {} ended", easyrtcid, addr);
}

/// Parses one inbound frame and emits it on the matching topic.
async fn route_inbound(
    bus: &Arc<EventBus<EventPayload>>,
    sockets: &Arc<SocketManager>,
    easyrtcid: &str,
    text: &str,
) {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            debug!("Malformed envelope from '{}': {}", easyrtcid, e);
            send_transport_error(sockets, easyrtcid, "MSG_REJECT_BAD_STRUCTURE").await;
            return;
        }
    };

    let topic = if envelope.msg_type == "authenticate" {
        EVENT_AUTH
    } else if COMMAND_MSG_TYPES.contains(&envelope.msg_type.as_str()) {
        EVENT_CMD
    } else if envelope.has_destination() {
        EVENT_MSG
    } else {
        // No destination and no known subtype; the command handler
        // rejects it with MSG_REJECT_BAD_TYPE.
        EVENT_CMD
    };
    if let Err(e) = bus
        .emit(topic, EventPayload::with_envelope(easyrtcid, envelope))
        .await
    {
        warn!("Routing '{}' frame from '{}' failed: {}", topic, easyrtcid, e);
    }
}

/// Sends an error envelope straight through the socket registry, for
/// failures detected before the protocol layer is reachable.
async fn send_transport_error(sockets: &Arc<SocketManager>, easyrtcid: &str, error_code: &str) {
    let envelope = OutboundEnvelope {
        msg_type: "error".to_string(),
        easyrtcid: easyrtcid.to_string(),
        server_time: signal_events::current_timestamp_millis(),
        sender_easyrtcid: None,
        target_room: None,
        target_group: None,
        msg_data: Some(json!({
            "errorCode": error_code,
            "errorText": codes::error_text(error_code),
        })),
    };
    match serde_json::to_vec(&envelope) {
        Ok(data) => {
            if let Err(e) = sockets.send_raw(easyrtcid, data).await {
                debug!("Transport error to '{}' not delivered: {}", easyrtcid, e);
            }
        }
        Err(e) => warn!("Failed to serialize error envelope: {}", e),
    }
}
