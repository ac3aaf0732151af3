//! Wire message type definitions for client communication.
//!
//! All envelopes share one JSON shape keyed by `msgType`. Inbound envelopes
//! deserialize into [`ClientEnvelope`]; outbound envelopes are built through
//! [`OutboundEnvelope`], which injects the recipient's `easyrtcid` and the
//! server timestamp on every send.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Command subtypes handled on the command channel.
///
/// Any inbound envelope whose `msgType` is in this list is routed to the
/// command handler; other non-auth types with a destination are treated as
/// application messages.
pub const COMMAND_MSG_TYPES: &[&str] = &[
    "setUserCfg",
    "setPresence",
    "setRoomApiField",
    "roomJoin",
    "roomLeave",
    "getIceConfig",
    "getRoomList",
    "candidate",
    "offer",
    "answer",
    "reject",
    "hangup",
];

/// WebRTC negotiation subtypes relayed verbatim between two peers.
pub const RELAY_MSG_TYPES: &[&str] = &["candidate", "offer", "answer", "reject", "hangup"];

/// An inbound message envelope from a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientEnvelope {
    /// Message type discriminator.
    pub msg_type: String,
    /// Type-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_data: Option<Value>,
    /// Destination connection identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_easyrtcid: Option<String>,
    /// Destination room name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_room: Option<String>,
    /// Destination group name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_group: Option<String>,
}

impl ClientEnvelope {
    /// Returns true when any destination field is present.
    pub fn has_destination(&self) -> bool {
        self.target_easyrtcid.is_some() || self.target_room.is_some() || self.target_group.is_some()
    }
}

/// Payload of an `authenticate` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthRequest {
    /// Client API version string.
    pub api_version: Option<String>,
    /// Application to authenticate into; the `appDefaultName` option
    /// applies when absent.
    pub application_name: Option<String>,
    /// Session identifier to bind the connection to.
    pub easyrtcsid: Option<String>,
    /// Optional username; multiple connections may share one.
    pub username: Option<String>,
    /// Opaque credential forwarded to the authenticate hook.
    pub credential: Option<Value>,
    /// Initial presence to apply before the roster snapshot is built.
    pub set_presence: Option<PresenceUpdate>,
    /// Rooms to enter during authentication, keyed by room name.
    pub room_join: Option<HashMap<String, RoomJoinRequest>>,
}

/// A single room entry inside an auth or roomJoin request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomJoinRequest {
    /// Room name; must agree with the enclosing map key when present.
    pub room_name: Option<String>,
    /// Client-supplied join parameter, currently unused by the server.
    pub room_parameter: Option<Value>,
}

/// Presence update supplied by a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenceUpdate {
    /// Availability; one of `away`, `chat`, `dnd`, `xa`.
    pub show: Option<String>,
    /// Free-form status value.
    pub status: Option<Value>,
}

/// Valid values for the presence `show` field.
pub const PRESENCE_SHOW_VALUES: &[&str] = &["away", "chat", "dnd", "xa"];

/// A connection's presence as stored and broadcast in rosters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPresence {
    /// Availability; one of `away`, `chat`, `dnd`, `xa`.
    pub show: String,
    /// Free-form status, serialized as null when unset.
    pub status: Option<Value>,
}

impl Default for ClientPresence {
    fn default() -> Self {
        Self {
            show: "chat".to_string(),
            status: None,
        }
    }
}

/// One client's entry in a room roster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Connection identifier.
    pub easyrtcid: String,
    /// Epoch milliseconds at which the client entered the room.
    pub room_join_time: u64,
    /// Current presence.
    pub presence: ClientPresence,
    /// Per-room application field, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_field: Option<Value>,
    /// Username, when the connection authenticated with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Marker entry for a client removed from a roster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedClient {
    /// Connection identifier of the departed client.
    pub easyrtcid: String,
}

/// Incremental roster change shipped inside a `roomData` update.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientListDelta {
    /// Clients newly visible in the room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_client: Option<HashMap<String, RosterEntry>>,
    /// Clients whose roster entry changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_client: Option<HashMap<String, RosterEntry>>,
    /// Clients that left the room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_client: Option<HashMap<String, RemovedClient>>,
}

/// Status discriminator of a `roomData` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Full snapshot delivered on room entry.
    Join,
    /// Incremental delta.
    Update,
    /// The recipient left the room.
    Leave,
}

/// One room's worth of roster data inside a `roomData` envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDataEntry {
    /// Room name.
    pub room_name: String,
    /// Snapshot, delta, or departure marker.
    pub room_status: RoomStatus,
    /// Full roster, present on `join` snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_list: Option<HashMap<String, RosterEntry>>,
    /// Incremental change, present on `update` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_list_delta: Option<ClientListDelta>,
    /// Shared room fields in wire form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<Value>,
}

/// An outbound message envelope to a client.
///
/// The recipient's own `easyrtcid` and the server timestamp are stamped on
/// every outbound envelope without exception.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    /// Message type discriminator.
    pub msg_type: String,
    /// The recipient's connection identifier.
    pub easyrtcid: String,
    /// Server clock in epoch milliseconds at send time.
    pub server_time: u64,
    /// Originating connection, set on relayed and application messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_easyrtcid: Option<String>,
    /// Room the message was addressed to, echoed on room fan-out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_room: Option<String>,
    /// Group the message was addressed to, echoed on group fan-out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_group: Option<String>,
    /// Type-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_data: Option<Value>,
}
