//! Outbound envelope construction and delivery.
//!
//! Every push to a client funnels through [`send`], which stamps the
//! recipient's `easyrtcid` and `serverTime` onto the envelope and hands the
//! serialized bytes to the injected [`signal_events::ClientSender`].
//! Fan-out call sites treat failures as log-and-skip.

use crate::error::{SignalError, SignalResult};
use crate::protocol::codes;
use crate::protocol::types::{OutboundEnvelope, RoomDataEntry};
use crate::state::server::ServerState;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

/// An outbound message before recipient stamping.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    /// Message type discriminator.
    pub msg_type: String,
    /// Type-specific payload.
    pub msg_data: Option<Value>,
    /// Originating connection for relays and application messages.
    pub sender_easyrtcid: Option<String>,
    /// Echoed room destination on room fan-out.
    pub target_room: Option<String>,
    /// Echoed group destination on group fan-out.
    pub target_group: Option<String>,
}

impl OutboundMessage {
    /// Creates a message with the given type and no payload.
    pub fn new(msg_type: &str) -> Self {
        Self {
            msg_type: msg_type.to_string(),
            ..Self::default()
        }
    }

    /// Sets the payload.
    pub fn with_data(mut self, msg_data: Value) -> Self {
        self.msg_data = Some(msg_data);
        self
    }

    /// Sets the originating connection.
    pub fn with_sender(mut self, sender_easyrtcid: &str) -> Self {
        self.sender_easyrtcid = Some(sender_easyrtcid.to_string());
        self
    }
}

/// Stamps, serializes, and delivers one envelope to one client.
pub async fn send(state: &ServerState, easyrtcid: &str, msg: OutboundMessage) -> SignalResult<()> {
    let Some(sender) = state.client_sender().await else {
        return Err(SignalError::Server(
            "No client sender configured".to_string(),
        ));
    };
    let envelope = OutboundEnvelope {
        msg_type: msg.msg_type,
        easyrtcid: easyrtcid.to_string(),
        server_time: signal_events::current_timestamp_millis(),
        sender_easyrtcid: msg.sender_easyrtcid,
        target_room: msg.target_room,
        target_group: msg.target_group,
        msg_data: msg.msg_data,
    };
    let data = serde_json::to_vec(&envelope)
        .map_err(|e| SignalError::Server(format!("Failed to serialize envelope: {e}")))?;
    sender
        .send_to_client(easyrtcid, data)
        .await
        .map_err(|e| SignalError::ConnectionWarning(format!("Send to '{easyrtcid}' failed: {e}")))
}

/// Sends an `error` envelope carrying a code from the closed catalog.
pub async fn send_error(state: &ServerState, easyrtcid: &str, error_code: &str) {
    let msg = OutboundMessage::new("error").with_data(json!({
        "errorCode": error_code,
        "errorText": codes::error_text(error_code),
    }));
    if let Err(e) = send(state, easyrtcid, msg).await {
        debug!("Error envelope to '{}' not delivered: {}", easyrtcid, e);
    }
}

/// Sends a bare `ack` envelope.
pub async fn send_ack(state: &ServerState, easyrtcid: &str) {
    if let Err(e) = send(state, easyrtcid, OutboundMessage::new("ack")).await {
        debug!("Ack to '{}' not delivered: {}", easyrtcid, e);
    }
}

/// Sends a `roomData` envelope carrying entries for one or more rooms.
pub async fn send_room_data(
    state: &ServerState,
    easyrtcid: &str,
    entries: HashMap<String, RoomDataEntry>,
) {
    if entries.is_empty() {
        return;
    }
    let msg = OutboundMessage::new("roomData").with_data(json!({ "roomData": entries }));
    if let Err(e) = send(state, easyrtcid, msg).await {
        debug!("Room data to '{}' not delivered: {}", easyrtcid, e);
    }
}
