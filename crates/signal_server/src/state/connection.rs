//! Per-client connection records.
//!
//! A [`ClientConnection`] is created during authentication and lives until
//! its socket closes. It owns the per-connection identity (username,
//! credential, presence, fields) and the junction map of rooms it occupies,
//! and drives roster snapshot and delta generation for those rooms.

use crate::error::{SignalError, SignalResult};
use crate::protocol::outbound;
use crate::protocol::types::{
    ClientPresence, PresenceUpdate, PRESENCE_SHOW_VALUES, RoomDataEntry, RoomStatus,
};
use crate::state::application::Application;
use crate::state::field::{Field, FieldMap};
use crate::state::options;
use crate::state::room::{ConnectionRoom, Room};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// State record for one connected client.
#[derive(Debug)]
pub struct ClientConnection {
    /// Connection identifier, unique per process.
    easyrtcid: String,
    /// Back-reference to the owning application.
    app: Weak<Application>,
    /// Epoch milliseconds at which the record was created.
    connected_on: u64,
    /// Set once authentication completes.
    authenticated: AtomicBool,
    /// Set once the connection has been torn down. A removed record is a
    /// zombie and refuses room joins.
    removed: AtomicBool,
    /// Optional username; not unique across connections.
    username: RwLock<Option<String>>,
    /// Opaque credential captured at authentication.
    credential: RwLock<Option<Value>>,
    /// Current presence.
    presence: RwLock<ClientPresence>,
    /// Connection fields.
    fields: RwLock<FieldMap>,
    /// Junctions for every occupied room, keyed by room name.
    rooms: RwLock<HashMap<String, Arc<ConnectionRoom>>>,
    /// Bound session identifier, when sessions are enabled.
    easyrtcsid: RwLock<Option<String>>,
}

impl ClientConnection {
    pub(crate) fn new(
        easyrtcid: &str,
        app: Weak<Application>,
        default_field_obj: &Value,
    ) -> Arc<Self> {
        let mut fields = FieldMap::new();
        fields.apply_default_field_obj(default_field_obj);
        Arc::new(Self {
            easyrtcid: easyrtcid.to_string(),
            app,
            connected_on: signal_events::current_timestamp_millis(),
            authenticated: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            username: RwLock::new(None),
            credential: RwLock::new(None),
            presence: RwLock::new(ClientPresence::default()),
            fields: RwLock::new(fields),
            rooms: RwLock::new(HashMap::new()),
            easyrtcsid: RwLock::new(None),
        })
    }

    /// Connection identifier.
    pub fn easyrtcid(&self) -> &str {
        &self.easyrtcid
    }

    /// Returns the owning application when it is still alive.
    pub fn app(&self) -> Option<Arc<Application>> {
        self.app.upgrade()
    }

    /// Epoch milliseconds at which the record was created.
    pub fn connected_on(&self) -> u64 {
        self.connected_on
    }

    /// Returns true once authentication has completed.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub(crate) fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::Release);
    }

    /// Returns true once the connection has been torn down.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    // ---- identity ----

    /// Returns the username, when one was supplied at authentication.
    pub async fn username(&self) -> Option<String> {
        self.username.read().await.clone()
    }

    /// Sets the username. The value must match `usernameRegExp`.
    pub async fn set_username(&self, username: &str) -> SignalResult<()> {
        let pattern_ok = match self.app() {
            Some(app) => {
                app.pattern_matches(options::USERNAME_REG_EXP, username)
                    .await
            }
            None => false,
        };
        if !pattern_ok {
            return Err(SignalError::ConnectionWarning(format!(
                "Invalid username '{username}'"
            )));
        }
        *self.username.write().await = Some(username.to_string());
        Ok(())
    }

    /// Returns the credential captured at authentication.
    pub async fn credential(&self) -> Option<Value> {
        self.credential.read().await.clone()
    }

    /// Stores the opaque credential.
    pub async fn set_credential(&self, credential: Value) {
        *self.credential.write().await = Some(credential);
    }

    /// Returns the bound session identifier.
    pub async fn easyrtcsid(&self) -> Option<String> {
        self.easyrtcsid.read().await.clone()
    }

    pub(crate) async fn set_easyrtcsid(&self, easyrtcsid: &str) {
        *self.easyrtcsid.write().await = Some(easyrtcsid.to_string());
    }

    pub(crate) async fn take_easyrtcsid(&self) -> Option<String> {
        self.easyrtcsid.write().await.take()
    }

    // ---- presence ----

    /// Current presence.
    pub async fn presence(&self) -> ClientPresence {
        self.presence.read().await.clone()
    }

    /// Applies a presence update.
    ///
    /// An absent `show` keeps the current value; a present one must be a
    /// member of the fixed show set.
    pub async fn apply_presence(&self, update: &PresenceUpdate) -> SignalResult<()> {
        let mut presence = self.presence.write().await;
        if let Some(show) = &update.show {
            if !PRESENCE_SHOW_VALUES.contains(&show.as_str()) {
                return Err(SignalError::ConnectionWarning(format!(
                    "Invalid presence show value '{show}'"
                )));
            }
            presence.show = show.clone();
        }
        presence.status = update.status.clone();
        Ok(())
    }

    // ---- fields ----

    /// Sets a connection field. The name must match `fieldNameRegExp`.
    pub async fn set_field(&self, name: &str, value: Value, is_shared: bool) -> SignalResult<()> {
        let pattern_ok = match self.app() {
            Some(app) => {
                app.pattern_matches(options::FIELD_NAME_REG_EXP, name)
                    .await
            }
            None => false,
        };
        if !pattern_ok {
            return Err(SignalError::ConnectionWarning(format!(
                "Invalid field name '{name}'"
            )));
        }
        self.fields.write().await.set(name, value, is_shared);
        Ok(())
    }

    /// Returns a connection field.
    pub async fn get_field(&self, name: &str) -> Option<Field> {
        self.fields.read().await.get(name).cloned()
    }

    /// Returns shared connection fields in wire form, or `None` when none
    /// are shared.
    pub async fn shared_fields_wire(&self) -> Option<Value> {
        self.fields.read().await.shared_wire()
    }

    // ---- rooms ----

    /// Joins a room, creating the junction and registering the connection
    /// as an occupant in one step.
    ///
    /// Joining a room already occupied returns the existing junction.
    /// Zombie connections (already torn down) are refused.
    pub async fn join_room(self: &Arc<Self>, room: &Arc<Room>) -> SignalResult<Arc<ConnectionRoom>> {
        if self.is_removed() {
            return Err(SignalError::ConnectionWarning(format!(
                "Zombie connection '{}' refused room join",
                self.easyrtcid
            )));
        }
        if room.is_deleted() {
            return Err(SignalError::ApplicationWarning(format!(
                "Room '{}' has been deleted",
                room.name()
            )));
        }

        let mut rooms = self.rooms.write().await;
        if let Some(existing) = rooms.get(room.name()) {
            return Ok(existing.clone());
        }
        let entered_on = signal_events::current_timestamp_millis();
        let junction = ConnectionRoom::new(room, &self.easyrtcid, self.app.clone(), entered_on);
        rooms.insert(room.name().to_string(), junction.clone());
        drop(rooms);

        // Junction first, roster second. Between the two awaits another task
        // can observe the junction without the roster entry, never the
        // reverse; roster-driven fan-out skips connections mid-transition.
        room.insert_occupant(&self.easyrtcid, entered_on).await;
        info!(
            "🚪 Connection '{}' joined room '{}'",
            self.easyrtcid,
            room.name()
        );
        Ok(junction)
    }

    /// Returns the junction for an occupied room.
    pub async fn room_junction(&self, room_name: &str) -> Option<Arc<ConnectionRoom>> {
        self.rooms.read().await.get(room_name).cloned()
    }

    /// Lists the names of occupied rooms.
    pub async fn occupied_room_names(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub(crate) async fn remove_junction(&self, room_name: &str) {
        self.rooms.write().await.remove(room_name);
    }

    // ---- roster snapshots and deltas ----

    /// Builds full roster snapshots for occupied rooms.
    ///
    /// With `filter` set only the named rooms are included. Each snapshot
    /// carries the room's shared fields and refreshes the junction's
    /// roster-fetch baseline.
    pub async fn generate_room_client_list(
        &self,
        room_status: RoomStatus,
        filter: Option<&[String]>,
    ) -> HashMap<String, RoomDataEntry> {
        let junctions: Vec<Arc<ConnectionRoom>> =
            self.rooms.read().await.values().cloned().collect();
        let mut out = HashMap::new();
        for junction in junctions {
            if let Some(names) = filter {
                if !names.iter().any(|n| n == junction.room_name()) {
                    continue;
                }
            }
            let Some(room) = junction.room() else {
                continue;
            };
            junction.touch_roster_fetch().await;
            out.insert(
                junction.room_name().to_string(),
                RoomDataEntry {
                    room_name: junction.room_name().to_string(),
                    room_status,
                    client_list: Some(room.roster_entries().await),
                    client_list_delta: None,
                    field: room.shared_fields_wire().await,
                },
            );
        }
        out
    }

    /// Builds `update` deltas for every occupied room.
    pub async fn generate_room_data_delta(
        &self,
        leaving: bool,
    ) -> HashMap<String, RoomDataEntry> {
        let junctions: Vec<Arc<ConnectionRoom>> =
            self.rooms.read().await.values().cloned().collect();
        let mut out = HashMap::new();
        for junction in junctions {
            match junction.generate_room_data_delta(leaving).await {
                Ok(entry) => {
                    out.insert(junction.room_name().to_string(), entry);
                }
                Err(e) => {
                    warn!(
                        "Delta for room '{}' skipped: {}",
                        junction.room_name(),
                        e
                    );
                }
            }
        }
        out
    }

    /// Pushes this connection's roster deltas to every occupant sharing a
    /// room with it, returning the deltas keyed by room name.
    ///
    /// Each recipient receives one `roomData` envelope restricted to the
    /// rooms they actually share with this connection. The sender itself is
    /// always excluded; command handlers reply to it with the returned
    /// deltas. Delivery failures are logged and skipped.
    pub async fn emit_room_data_delta(
        &self,
        leaving: bool,
    ) -> SignalResult<HashMap<String, RoomDataEntry>> {
        let state = self
            .app()
            .and_then(|app| app.server())
            .ok_or_else(|| SignalError::Server("Server state no longer available".to_string()))?;

        let junctions: Vec<Arc<ConnectionRoom>> =
            self.rooms.read().await.values().cloned().collect();
        let mut deltas: HashMap<String, RoomDataEntry> = HashMap::new();
        let mut recipients: HashMap<String, Vec<String>> = HashMap::new();
        for junction in junctions {
            let Some(room) = junction.room() else {
                continue;
            };
            let entry = match junction.generate_room_data_delta(leaving).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        "Delta for room '{}' skipped: {}",
                        junction.room_name(),
                        e
                    );
                    continue;
                }
            };
            for occupant in room.occupant_ids().await {
                if occupant != self.easyrtcid {
                    recipients
                        .entry(occupant)
                        .or_default()
                        .push(junction.room_name().to_string());
                }
            }
            deltas.insert(junction.room_name().to_string(), entry);
        }

        for (recipient, room_names) in recipients {
            let mut entries = HashMap::new();
            for name in room_names {
                if let Some(entry) = deltas.get(&name) {
                    entries.insert(name, entry.clone());
                }
            }
            outbound::send_room_data(&state, &recipient, entries).await;
        }
        Ok(deltas)
    }

    // ---- teardown ----

    /// Tears the connection down: leaves every room (notifying remaining
    /// occupants), unbinds the session, purges group memberships, and
    /// removes the record from the application.
    ///
    /// Individual room-leave failures are logged and the teardown
    /// continues; the record is always removed.
    pub async fn disconnect(self: &Arc<Self>) -> SignalResult<()> {
        let app = self.app().ok_or_else(|| {
            SignalError::Application("Application no longer available".to_string())
        })?;

        for room_name in self.occupied_room_names().await {
            if let Some(junction) = self.room_junction(&room_name).await {
                if let Err(e) = junction.leave_room().await {
                    warn!(
                        "Room leave for '{}' during disconnect of '{}' failed: {}",
                        room_name, self.easyrtcid, e
                    );
                }
            }
        }

        if let Some(easyrtcsid) = self.take_easyrtcsid().await {
            if let Some(session) = app.get_session(&easyrtcsid).await {
                session.unbind(&self.easyrtcid).await;
            }
        }
        app.purge_from_groups(&self.easyrtcid).await;

        self.set_authenticated(false);
        self.removed.store(true, Ordering::Release);
        app.remove_connection(&self.easyrtcid).await;
        debug!("🔌 Connection '{}' removed", self.easyrtcid);
        Ok(())
    }
}
