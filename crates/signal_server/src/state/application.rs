//! Application namespaces within the state registry.
//!
//! An application isolates its connections, rooms, sessions, and groups
//! from every other application. Option lookups fall back to the server
//! level when unset locally.

use crate::error::{SignalError, SignalResult};
use crate::state::connection::ClientConnection;
use crate::state::field::{Field, FieldMap};
use crate::state::group::Group;
use crate::state::options;
use crate::state::room::Room;
use crate::state::server::ServerState;
use crate::state::session::Session;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// An isolated application namespace.
#[derive(Debug)]
pub struct Application {
    /// Application name, fixed at creation.
    name: String,
    /// Back-reference to the owning registry.
    server: Weak<ServerState>,
    /// Application-level option overrides.
    options: RwLock<HashMap<String, Value>>,
    /// Application fields.
    fields: RwLock<FieldMap>,
    /// Connections by easyrtcid.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    /// Rooms by name. Deleted rooms are removed from this map.
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    /// Sessions by easyrtcsid.
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Groups by name.
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Application {
    /// Creates an application with the given default field object applied.
    pub(crate) fn new(
        name: &str,
        server: Weak<ServerState>,
        default_field_obj: &Value,
    ) -> Arc<Self> {
        let mut fields = FieldMap::new();
        fields.apply_default_field_obj(default_field_obj);
        Arc::new(Self {
            name: name.to_string(),
            server,
            options: RwLock::new(HashMap::new()),
            fields: RwLock::new(fields),
            connections: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        })
    }

    /// Application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning registry when it is still alive.
    pub fn server(&self) -> Option<Arc<ServerState>> {
        self.server.upgrade()
    }

    // ---- options ----

    /// Sets an application-level option override.
    pub async fn set_option(&self, name: &str, value: Value) -> SignalResult<()> {
        if !options::is_known_option(name) {
            return Err(SignalError::ApplicationWarning(format!(
                "Unknown option name '{name}'"
            )));
        }
        self.options.write().await.insert(name.to_string(), value);
        Ok(())
    }

    /// Returns an option value, falling back to the server level.
    pub async fn get_option(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.options.read().await.get(name).cloned() {
            return Some(value);
        }
        match self.server() {
            Some(server) => server.get_option(name).await,
            None => None,
        }
    }

    /// Returns an option interpreted as a boolean with fallback.
    pub async fn option_bool(&self, name: &str) -> bool {
        self.get_option(name)
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Returns an option interpreted as a string with fallback.
    pub async fn option_str(&self, name: &str) -> Option<String> {
        self.get_option(name)
            .await
            .and_then(|v| v.as_str().map(String::from))
    }

    /// Tests a candidate against the pattern stored in a `*RegExp` option,
    /// resolved with fallback.
    pub async fn pattern_matches(&self, pattern_option: &str, candidate: &str) -> bool {
        match self.option_str(pattern_option).await {
            Some(pattern) => options::pattern_matches(&pattern, candidate),
            None => false,
        }
    }

    // ---- fields ----

    /// Sets an application field.
    ///
    /// The name must match `fieldNameRegExp`.
    pub async fn set_field(&self, name: &str, value: Value, is_shared: bool) -> SignalResult<()> {
        if !self
            .pattern_matches(options::FIELD_NAME_REG_EXP, name)
            .await
        {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid field name '{name}'"
            )));
        }
        self.fields.write().await.set(name, value, is_shared);
        Ok(())
    }

    /// Returns an application field.
    pub async fn get_field(&self, name: &str) -> Option<Field> {
        self.fields.read().await.get(name).cloned()
    }

    /// Returns application fields in wire form.
    pub async fn get_fields(&self, shared_only: bool) -> Map<String, Value> {
        self.fields.read().await.wire_map(shared_only)
    }

    /// Returns shared application fields in wire form, or `None` when none
    /// are shared.
    pub async fn shared_fields_wire(&self) -> Option<Value> {
        self.fields.read().await.shared_wire()
    }

    // ---- connections ----

    /// Creates a connection record for an easyrtcid.
    ///
    /// The identifier must match `easyrtcidRegExp` and must not already be
    /// registered. Default connection fields from
    /// `connectionDefaultFieldObj` are applied.
    pub async fn create_connection(
        self: &Arc<Self>,
        easyrtcid: &str,
    ) -> SignalResult<Arc<ClientConnection>> {
        if !self
            .pattern_matches(options::EASYRTCID_REG_EXP, easyrtcid)
            .await
        {
            return Err(SignalError::ConnectionWarning(format!(
                "Invalid easyrtcid '{easyrtcid}'"
            )));
        }
        let default_fields = self
            .get_option(options::CONNECTION_DEFAULT_FIELD_OBJ)
            .await
            .unwrap_or(Value::Null);

        let mut connections = self.connections.write().await;
        if connections.contains_key(easyrtcid) {
            return Err(SignalError::ConnectionWarning(format!(
                "Connection '{easyrtcid}' already exists"
            )));
        }
        let conn = ClientConnection::new(easyrtcid, Arc::downgrade(self), &default_fields);
        connections.insert(easyrtcid.to_string(), conn.clone());
        debug!("🔗 Connection '{}' registered in app '{}'", easyrtcid, self.name);
        Ok(conn)
    }

    /// Returns a connection by easyrtcid.
    pub async fn get_connection(&self, easyrtcid: &str) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(easyrtcid).cloned()
    }

    /// Removes a connection record, returning it when present.
    pub(crate) async fn remove_connection(
        &self,
        easyrtcid: &str,
    ) -> Option<Arc<ClientConnection>> {
        self.connections.write().await.remove(easyrtcid)
    }

    /// Lists the easyrtcids of all registered connections.
    pub async fn connected_ids(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// Returns the easyrtcids of every connection authenticated with the
    /// given username. Usernames are not unique.
    pub async fn ids_for_username(&self, username: &str) -> Vec<String> {
        let connections = self.connections.read().await;
        let mut out = Vec::new();
        for (id, conn) in connections.iter() {
            if conn.username().await.as_deref() == Some(username) {
                out.push(id.clone());
            }
        }
        out
    }

    // ---- rooms ----

    /// Creates a room, optionally applying room-level options atomically.
    ///
    /// All supplied option names are validated before the room becomes
    /// visible, so a bad option aborts the whole creation. Default room
    /// fields from `roomDefaultFieldObj` are applied.
    pub async fn create_room(
        self: &Arc<Self>,
        room_name: &str,
        room_options: Option<HashMap<String, Value>>,
    ) -> SignalResult<Arc<Room>> {
        if !self
            .pattern_matches(options::ROOM_NAME_REG_EXP, room_name)
            .await
        {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid room name '{room_name}'"
            )));
        }
        if let Some(opts) = &room_options {
            for name in opts.keys() {
                if !options::is_known_option(name) {
                    return Err(SignalError::ApplicationWarning(format!(
                        "Unknown option name '{name}' for room '{room_name}'"
                    )));
                }
            }
        }
        let default_fields = self
            .get_option(options::ROOM_DEFAULT_FIELD_OBJ)
            .await
            .unwrap_or(Value::Null);

        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(room_name) {
            return Err(SignalError::ApplicationWarning(format!(
                "Room '{room_name}' already exists"
            )));
        }
        let room = Room::new(
            room_name,
            Arc::downgrade(self),
            room_options.unwrap_or_default(),
            &default_fields,
        );
        rooms.insert(room_name.to_string(), room.clone());
        info!("🚪 Room created: '{}' in app '{}'", room_name, self.name);
        Ok(room)
    }

    /// Returns a room by name.
    pub async fn get_room(&self, room_name: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room_name).cloned()
    }

    /// Returns the room with the given name, creating it when absent.
    ///
    /// Concurrent callers for the same name all resolve to the single
    /// surviving instance.
    pub async fn get_or_create_room(self: &Arc<Self>, room_name: &str) -> SignalResult<Arc<Room>> {
        if !self
            .pattern_matches(options::ROOM_NAME_REG_EXP, room_name)
            .await
        {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid room name '{room_name}'"
            )));
        }
        let default_fields = self
            .get_option(options::ROOM_DEFAULT_FIELD_OBJ)
            .await
            .unwrap_or(Value::Null);

        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_name) {
            return Ok(room.clone());
        }
        let room = Room::new(
            room_name,
            Arc::downgrade(self),
            HashMap::new(),
            &default_fields,
        );
        rooms.insert(room_name.to_string(), room.clone());
        info!("🚪 Room created: '{}' in app '{}'", room_name, self.name);
        Ok(room)
    }

    /// Returns true when a room with the given name exists.
    pub async fn is_room(&self, room_name: &str) -> bool {
        self.rooms.read().await.contains_key(room_name)
    }

    /// Deletes an empty room.
    ///
    /// Deleting a missing or occupied room is refused.
    pub async fn delete_room(&self, room_name: &str) -> SignalResult<()> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(room_name) else {
            return Err(SignalError::ApplicationWarning(format!(
                "Room '{room_name}' does not exist"
            )));
        };
        if room.occupant_count().await > 0 {
            return Err(SignalError::ApplicationWarning(format!(
                "Room '{room_name}' is not empty"
            )));
        }
        room.mark_deleted();
        rooms.remove(room_name);
        info!("🚪 Room deleted: '{}' in app '{}'", room_name, self.name);
        Ok(())
    }

    /// Lists the names of all rooms.
    pub async fn room_names(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    // ---- sessions ----

    /// Creates a session.
    ///
    /// The identifier must match `easyrtcsidRegExp` and must not already
    /// exist.
    pub async fn create_session(self: &Arc<Self>, easyrtcsid: &str) -> SignalResult<Arc<Session>> {
        if !self
            .pattern_matches(options::EASYRTCSID_REG_EXP, easyrtcsid)
            .await
        {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid easyrtcsid '{easyrtcsid}'"
            )));
        }
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(easyrtcsid) {
            return Err(SignalError::ApplicationWarning(format!(
                "Session '{easyrtcsid}' already exists"
            )));
        }
        let session = Session::new(easyrtcsid, Arc::downgrade(self));
        sessions.insert(easyrtcsid.to_string(), session.clone());
        debug!("🎫 Session created: '{}' in app '{}'", easyrtcsid, self.name);
        Ok(session)
    }

    /// Returns a session by easyrtcsid.
    pub async fn get_session(&self, easyrtcsid: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(easyrtcsid).cloned()
    }

    /// Returns the session with the given identifier, creating it when
    /// absent.
    pub async fn get_or_create_session(
        self: &Arc<Self>,
        easyrtcsid: &str,
    ) -> SignalResult<Arc<Session>> {
        if !self
            .pattern_matches(options::EASYRTCSID_REG_EXP, easyrtcsid)
            .await
        {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid easyrtcsid '{easyrtcsid}'"
            )));
        }
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(easyrtcsid) {
            return Ok(session.clone());
        }
        let session = Session::new(easyrtcsid, Arc::downgrade(self));
        sessions.insert(easyrtcsid.to_string(), session.clone());
        debug!("🎫 Session created: '{}' in app '{}'", easyrtcsid, self.name);
        Ok(session)
    }

    // ---- groups ----

    /// Creates a group.
    ///
    /// The name must match `groupNameRegExp` and must not already exist.
    pub async fn create_group(self: &Arc<Self>, group_name: &str) -> SignalResult<Arc<Group>> {
        if !self
            .pattern_matches(options::GROUP_NAME_REG_EXP, group_name)
            .await
        {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid group name '{group_name}'"
            )));
        }
        let mut groups = self.groups.write().await;
        if groups.contains_key(group_name) {
            return Err(SignalError::ApplicationWarning(format!(
                "Group '{group_name}' already exists"
            )));
        }
        let group = Group::new(group_name, Arc::downgrade(self));
        groups.insert(group_name.to_string(), group.clone());
        Ok(group)
    }

    /// Returns a group by name.
    pub async fn get_group(&self, group_name: &str) -> Option<Arc<Group>> {
        self.groups.read().await.get(group_name).cloned()
    }

    /// Returns the group with the given name, creating it when absent.
    pub async fn get_or_create_group(self: &Arc<Self>, group_name: &str) -> SignalResult<Arc<Group>> {
        if !self
            .pattern_matches(options::GROUP_NAME_REG_EXP, group_name)
            .await
        {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid group name '{group_name}'"
            )));
        }
        let mut groups = self.groups.write().await;
        if let Some(group) = groups.get(group_name) {
            return Ok(group.clone());
        }
        let group = Group::new(group_name, Arc::downgrade(self));
        groups.insert(group_name.to_string(), group.clone());
        Ok(group)
    }

    /// Removes a departed connection from every group in the application.
    pub(crate) async fn purge_from_groups(&self, easyrtcid: &str) {
        let groups = self.groups.read().await;
        for group in groups.values() {
            group.remove_member(easyrtcid).await;
        }
    }
}
