//! Rooms and the per-connection room junction.
//!
//! A [`Room`] tracks its occupants by easyrtcid. A [`ConnectionRoom`] is
//! the junction a connection holds for each room it occupies, carrying the
//! per-room state (join time, apiField, roster-fetch baseline) and the
//! room-scoped delta emission used by the setRoomApiField command.

use crate::error::{SignalError, SignalResult};
use crate::protocol::outbound;
use crate::protocol::types::{ClientListDelta, RemovedClient, RoomDataEntry, RoomStatus, RosterEntry};
use crate::state::application::Application;
use crate::state::field::{Field, FieldMap};
use crate::state::options;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A room occupant record held by the room itself.
#[derive(Debug, Clone)]
pub struct RoomOccupant {
    /// Occupant connection identifier.
    pub easyrtcid: String,
    /// Epoch milliseconds at which the occupant entered.
    pub entered_on: u64,
}

/// A named room within an application.
#[derive(Debug)]
pub struct Room {
    /// Room name, fixed at creation.
    name: String,
    /// Back-reference to the owning application.
    app: Weak<Application>,
    /// Set once the room is deleted; stale handles refuse further use.
    deleted: AtomicBool,
    /// Occupants by easyrtcid.
    occupants: RwLock<HashMap<String, RoomOccupant>>,
    /// Room fields.
    fields: RwLock<FieldMap>,
    /// Room-level option overrides.
    options: RwLock<HashMap<String, Value>>,
}

impl Room {
    pub(crate) fn new(
        name: &str,
        app: Weak<Application>,
        room_options: HashMap<String, Value>,
        default_field_obj: &Value,
    ) -> Arc<Self> {
        let mut fields = FieldMap::new();
        fields.apply_default_field_obj(default_field_obj);
        Arc::new(Self {
            name: name.to_string(),
            app,
            deleted: AtomicBool::new(false),
            occupants: RwLock::new(HashMap::new()),
            fields: RwLock::new(fields),
            options: RwLock::new(room_options),
        })
    }

    /// Room name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning application when it is still alive.
    pub fn app(&self) -> Option<Arc<Application>> {
        self.app.upgrade()
    }

    /// Returns true once the room has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    // ---- options ----

    /// Sets a room-level option override.
    pub async fn set_option(&self, name: &str, value: Value) -> SignalResult<()> {
        if !options::is_known_option(name) {
            return Err(SignalError::ApplicationWarning(format!(
                "Unknown option name '{name}'"
            )));
        }
        self.options.write().await.insert(name.to_string(), value);
        Ok(())
    }

    /// Returns an option value, falling back to application then server.
    pub async fn get_option(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.options.read().await.get(name).cloned() {
            return Some(value);
        }
        match self.app() {
            Some(app) => app.get_option(name).await,
            None => None,
        }
    }

    // ---- fields ----

    /// Sets a room field. The name must match `fieldNameRegExp`.
    pub async fn set_field(&self, name: &str, value: Value, is_shared: bool) -> SignalResult<()> {
        let pattern_ok = match self.app() {
            Some(app) => {
                app.pattern_matches(options::FIELD_NAME_REG_EXP, name)
                    .await
            }
            None => false,
        };
        if !pattern_ok {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid field name '{name}'"
            )));
        }
        self.fields.write().await.set(name, value, is_shared);
        Ok(())
    }

    /// Returns a room field.
    pub async fn get_field(&self, name: &str) -> Option<Field> {
        self.fields.read().await.get(name).cloned()
    }

    /// Returns shared room fields in wire form, or `None` when none are
    /// shared.
    pub async fn shared_fields_wire(&self) -> Option<Value> {
        self.fields.read().await.shared_wire()
    }

    // ---- occupancy ----

    /// Number of current occupants.
    pub async fn occupant_count(&self) -> usize {
        self.occupants.read().await.len()
    }

    /// Lists occupant easyrtcids.
    pub async fn occupant_ids(&self) -> Vec<String> {
        self.occupants.read().await.keys().cloned().collect()
    }

    /// Returns true when the given connection occupies this room.
    pub async fn contains(&self, easyrtcid: &str) -> bool {
        self.occupants.read().await.contains_key(easyrtcid)
    }

    pub(crate) async fn insert_occupant(&self, easyrtcid: &str, entered_on: u64) {
        self.occupants.write().await.insert(
            easyrtcid.to_string(),
            RoomOccupant {
                easyrtcid: easyrtcid.to_string(),
                entered_on,
            },
        );
    }

    pub(crate) async fn remove_occupant(&self, easyrtcid: &str) -> bool {
        self.occupants.write().await.remove(easyrtcid).is_some()
    }

    /// Builds roster entries for every occupant.
    ///
    /// Occupants whose connection record has disappeared are skipped rather
    /// than failing the whole roster.
    pub async fn roster_entries(&self) -> HashMap<String, RosterEntry> {
        let Some(app) = self.app() else {
            return HashMap::new();
        };
        let occupants: Vec<RoomOccupant> =
            self.occupants.read().await.values().cloned().collect();
        let mut entries = HashMap::new();
        for occupant in occupants {
            let Some(conn) = app.get_connection(&occupant.easyrtcid).await else {
                warn!(
                    "Stale occupant '{}' in room '{}' skipped",
                    occupant.easyrtcid, self.name
                );
                continue;
            };
            let api_field = match conn.room_junction(&self.name).await {
                Some(junction) => junction.api_field().await,
                None => None,
            };
            entries.insert(
                occupant.easyrtcid.clone(),
                RosterEntry {
                    easyrtcid: occupant.easyrtcid.clone(),
                    room_join_time: occupant.entered_on,
                    presence: conn.presence().await,
                    api_field,
                    username: conn.username().await,
                },
            );
        }
        entries
    }
}

/// Junction between one connection and one room it occupies.
#[derive(Debug)]
pub struct ConnectionRoom {
    /// Room name.
    room_name: String,
    /// The room itself.
    room: Weak<Room>,
    /// Owning connection identifier.
    easyrtcid: String,
    /// Owning application.
    app: Weak<Application>,
    /// Epoch milliseconds at which the connection entered the room.
    entered_on: u64,
    /// Epoch milliseconds of the last full roster fetch.
    last_fetched: RwLock<u64>,
    /// Per-room application field pushed in roster entries.
    api_field: RwLock<Option<Value>>,
}

impl ConnectionRoom {
    pub(crate) fn new(
        room: &Arc<Room>,
        easyrtcid: &str,
        app: Weak<Application>,
        entered_on: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            room_name: room.name().to_string(),
            room: Arc::downgrade(room),
            easyrtcid: easyrtcid.to_string(),
            app,
            entered_on,
            last_fetched: RwLock::new(0),
            api_field: RwLock::new(None),
        })
    }

    /// Room name.
    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    /// Epoch milliseconds at which the connection entered the room.
    pub fn entered_on(&self) -> u64 {
        self.entered_on
    }

    /// Returns the room when it is still alive.
    pub fn room(&self) -> Option<Arc<Room>> {
        self.room.upgrade()
    }

    /// Returns the per-room application field.
    pub async fn api_field(&self) -> Option<Value> {
        self.api_field.read().await.clone()
    }

    /// Sets the per-room application field.
    pub async fn set_api_field(&self, value: Value) {
        *self.api_field.write().await = Some(value);
    }

    /// Epoch milliseconds of the last full roster fetch.
    pub async fn last_fetched(&self) -> u64 {
        *self.last_fetched.read().await
    }

    /// Records that the owning connection fetched a full roster snapshot.
    pub async fn touch_roster_fetch(&self) {
        *self.last_fetched.write().await = signal_events::current_timestamp_millis();
    }

    /// Builds this connection's roster entry for the room.
    pub async fn roster_entry(&self) -> Option<RosterEntry> {
        let app = self.app.upgrade()?;
        let conn = app.get_connection(&self.easyrtcid).await?;
        Some(RosterEntry {
            easyrtcid: self.easyrtcid.clone(),
            room_join_time: self.entered_on,
            presence: conn.presence().await,
            api_field: self.api_field().await,
            username: conn.username().await,
        })
    }

    /// Builds the `update` delta other occupants receive for this
    /// connection. With `leaving` set the delta removes the client instead
    /// of updating it.
    pub async fn generate_room_data_delta(&self, leaving: bool) -> SignalResult<RoomDataEntry> {
        let mut delta = ClientListDelta::default();
        if leaving {
            let mut removed = HashMap::new();
            removed.insert(
                self.easyrtcid.clone(),
                RemovedClient {
                    easyrtcid: self.easyrtcid.clone(),
                },
            );
            delta.remove_client = Some(removed);
        } else {
            let entry = self.roster_entry().await.ok_or_else(|| {
                SignalError::ConnectionWarning(format!(
                    "Connection '{}' no longer registered",
                    self.easyrtcid
                ))
            })?;
            let mut updated = HashMap::new();
            updated.insert(self.easyrtcid.clone(), entry);
            delta.update_client = Some(updated);
        }
        Ok(RoomDataEntry {
            room_name: self.room_name.clone(),
            room_status: RoomStatus::Update,
            client_list: None,
            client_list_delta: Some(delta),
            field: None,
        })
    }

    /// Pushes this connection's roster delta to the room's other occupants,
    /// returning the delta so the caller can reply with it.
    pub async fn emit_room_data_delta(&self, leaving: bool) -> SignalResult<RoomDataEntry> {
        let app = self.app.upgrade().ok_or_else(|| {
            SignalError::Application("Application no longer available".to_string())
        })?;
        let state = app.server().ok_or_else(|| {
            SignalError::Server("Server state no longer available".to_string())
        })?;
        let room = self.room().ok_or_else(|| {
            SignalError::ApplicationWarning(format!("Room '{}' no longer exists", self.room_name))
        })?;

        let delta = self.generate_room_data_delta(leaving).await?;
        for recipient in room.occupant_ids().await {
            if recipient == self.easyrtcid {
                continue;
            }
            let mut entries = HashMap::new();
            entries.insert(self.room_name.clone(), delta.clone());
            outbound::send_room_data(&state, &recipient, entries).await;
        }
        Ok(delta)
    }

    /// Removes the connection from the room and notifies the remaining
    /// occupants.
    pub async fn leave_room(&self) -> SignalResult<()> {
        let app = self.app.upgrade().ok_or_else(|| {
            SignalError::Application("Application no longer available".to_string())
        })?;
        let room = self.room().ok_or_else(|| {
            SignalError::ApplicationWarning(format!("Room '{}' no longer exists", self.room_name))
        })?;

        // Roster entry first, junction second, mirroring the join order.
        // The transient state between the awaits is a junction without a
        // roster entry, so roster-driven fan-out never sees a half-left
        // occupant.
        if !room.remove_occupant(&self.easyrtcid).await {
            return Err(SignalError::ConnectionWarning(format!(
                "Connection '{}' is not in room '{}'",
                self.easyrtcid, self.room_name
            )));
        }
        if let Some(conn) = app.get_connection(&self.easyrtcid).await {
            conn.remove_junction(&self.room_name).await;
        }
        debug!(
            "🚪 Connection '{}' left room '{}'",
            self.easyrtcid, self.room_name
        );

        // Departure delta for the remaining occupants.
        if let Some(state) = app.server() {
            let delta = self.generate_room_data_delta(true).await?;
            for recipient in room.occupant_ids().await {
                let mut entries = HashMap::new();
                entries.insert(self.room_name.clone(), delta.clone());
                outbound::send_room_data(&state, &recipient, entries).await;
            }
        }
        Ok(())
    }
}
