//! Default protocol listeners and inbound message routing.
//!
//! The [`Router`] owns the default listener for every routed topic. An
//! embedding application can override any of them through the bus and
//! restore the built-in behavior later; the router itself never assumes
//! its listeners are the ones installed.

use crate::error::SignalResult;
use crate::protocol::outbound::{self, OutboundMessage};
use crate::protocol::types::{
    AuthRequest, ClientEnvelope, PresenceUpdate, RoomDataEntry, RoomStatus, RELAY_MSG_TYPES,
};
use crate::protocol::validation;
use crate::state::application::Application;
use crate::state::connection::ClientConnection;
use crate::state::options;
use crate::state::room::Room;
use crate::state::server::ServerState;
use serde_json::{json, Value};
use signal_events::{EventBus, EventError, Listener};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Topic emitted when a socket connects, before authentication.
pub const EVENT_CONNECTION: &str = "connection";
/// Topic carrying `authenticate` envelopes.
pub const EVENT_AUTH: &str = "easyrtcAuth";
/// Topic carrying command envelopes.
pub const EVENT_CMD: &str = "easyrtcCmd";
/// Topic carrying application-message envelopes.
pub const EVENT_MSG: &str = "easyrtcMsg";
/// Topic emitted when a socket closes.
pub const EVENT_DISCONNECT: &str = "disconnect";
/// Credential-check hook run during authentication. The default accepts
/// every request; embedders override it to enforce credentials.
pub const EVENT_AUTHENTICATE: &str = "authenticate";
/// Hook run after authentication completes.
pub const EVENT_AUTHENTICATED: &str = "authenticated";
/// Hook emitted once when the server starts.
pub const EVENT_STARTUP: &str = "startup";

/// Payload carried on every bus topic.
#[derive(Debug, Clone)]
pub struct EventPayload {
    /// The socket's connection identifier.
    pub socket_id: String,
    /// The inbound envelope, absent on connection lifecycle topics.
    pub envelope: Option<ClientEnvelope>,
}

impl EventPayload {
    /// Payload for a lifecycle topic with no envelope.
    pub fn lifecycle(socket_id: &str) -> Self {
        Self {
            socket_id: socket_id.to_string(),
            envelope: None,
        }
    }

    /// Payload carrying an inbound envelope.
    pub fn with_envelope(socket_id: &str, envelope: ClientEnvelope) -> Self {
        Self {
            socket_id: socket_id.to_string(),
            envelope: Some(envelope),
        }
    }
}

/// Routes bus topics to the default protocol behavior.
#[derive(Debug)]
pub struct Router {
    state: Arc<ServerState>,
    bus: Arc<EventBus<EventPayload>>,
}

impl Router {
    /// Creates a router over the given registry and bus.
    pub fn new(state: Arc<ServerState>, bus: Arc<EventBus<EventPayload>>) -> Arc<Self> {
        Arc::new(Self { state, bus })
    }

    /// Registers the default listener for every routed topic and hook.
    pub fn register_default_listeners(self: &Arc<Self>) {
        self.bus
            .register_default(EVENT_CONNECTION, self.listener(Router::handle_connection));
        self.bus
            .register_default(EVENT_AUTH, self.listener(Router::handle_auth));
        self.bus
            .register_default(EVENT_CMD, self.listener(Router::handle_command));
        self.bus
            .register_default(EVENT_MSG, self.listener(Router::handle_message));
        self.bus
            .register_default(EVENT_DISCONNECT, self.listener(Router::handle_disconnect));
        self.bus
            .register_default(EVENT_AUTHENTICATE, self.listener(Router::handle_authenticate));
        self.bus.register_default(
            EVENT_AUTHENTICATED,
            self.listener(Router::handle_authenticated),
        );
        self.bus
            .register_default(EVENT_STARTUP, self.listener(Router::handle_startup));
        info!("🎧 Default protocol listeners registered");
    }

    fn listener<F, Fut>(self: &Arc<Self>, handler: F) -> Listener<EventPayload>
    where
        F: Fn(Arc<Router>, EventPayload) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = SignalResult<()>> + Send + 'static,
    {
        let router = self.clone();
        Arc::new(move |payload: EventPayload| {
            let fut = handler(router.clone(), payload);
            Box::pin(async move {
                fut.await
                    .map_err(|e| EventError::ListenerExecution(e.to_string()))
            })
        })
    }

    // ---- lifecycle topics ----

    async fn handle_connection(self: Arc<Self>, payload: EventPayload) -> SignalResult<()> {
        debug!("🔗 Socket connected: '{}'", payload.socket_id);
        Ok(())
    }

    async fn handle_authenticate(self: Arc<Self>, payload: EventPayload) -> SignalResult<()> {
        // Default credential check accepts everyone.
        debug!("🔑 Credential check passed for '{}'", payload.socket_id);
        Ok(())
    }

    async fn handle_authenticated(self: Arc<Self>, payload: EventPayload) -> SignalResult<()> {
        debug!("✅ Connection authenticated: '{}'", payload.socket_id);
        Ok(())
    }

    async fn handle_startup(self: Arc<Self>, _payload: EventPayload) -> SignalResult<()> {
        info!("🚀 Signaling server ready");
        Ok(())
    }

    async fn handle_disconnect(self: Arc<Self>, payload: EventPayload) -> SignalResult<()> {
        let socket_id = &payload.socket_id;
        if let Some((_, conn)) = self.state.find_connection(socket_id).await {
            conn.disconnect().await?;
        }
        info!("🔌 Socket disconnected: '{}'", socket_id);
        Ok(())
    }

    // ---- authentication ----

    async fn handle_auth(self: Arc<Self>, payload: EventPayload) -> SignalResult<()> {
        let socket_id = payload.socket_id.clone();
        if let Err(code) = self.run_auth_pipeline(payload).await {
            warn!("❌ Authentication for '{}' failed: {}", socket_id, code);
            outbound::send_error(&self.state, &socket_id, code).await;

            // A rejected re-authentication must not tear down the
            // established connection. Anything else gets its partial state
            // torn down and its socket closed.
            let established = matches!(
                self.state.find_connection(&socket_id).await,
                Some((_, conn)) if conn.is_authenticated()
            );
            if !established {
                if let Some((_, conn)) = self.state.find_connection(&socket_id).await {
                    let _ = conn.disconnect().await;
                }
                if let Some(sender) = self.state.client_sender().await {
                    let _ = sender
                        .kick(&socket_id, Some(format!("Authentication failed: {code}")))
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn run_auth_pipeline(&self, payload: EventPayload) -> Result<(), &'static str> {
        let socket_id = payload.socket_id.clone();
        let env = payload.envelope.clone().ok_or("LOGIN_BAD_STRUCTURE")?;
        let auth = validation::validate_auth(&self.state, &env).await?;

        // A socket authenticates at most once per connection.
        if let Some((_, existing)) = self.state.find_connection(&socket_id).await {
            if existing.is_authenticated() {
                return Err("LOGIN_BAD_AUTH");
            }
        }

        // Credential hook. The default accepts; an override can veto.
        self.bus
            .emit(EVENT_AUTHENTICATE, payload.clone())
            .await
            .map_err(|_| "LOGIN_BAD_AUTH")?;

        let app = self.resolve_application(&auth).await?;
        let conn = match app.get_connection(&socket_id).await {
            Some(conn) => conn,
            None => app
                .create_connection(&socket_id)
                .await
                .map_err(|_| "LOGIN_GEN_FAIL")?,
        };

        if let Some(username) = &auth.username {
            conn.set_username(username).await.map_err(|_| "LOGIN_GEN_FAIL")?;
        }
        if let Some(credential) = &auth.credential {
            conn.set_credential(credential.clone()).await;
        }
        if let Some(presence) = &auth.set_presence {
            conn.apply_presence(presence)
                .await
                .map_err(|_| "LOGIN_BAD_STRUCTURE")?;
        }

        let session = self.bind_session(&app, &conn, &auth).await?;
        conn.set_authenticated(true);
        self.join_initial_rooms(&app, &conn, &auth).await?;

        if let Err(e) = self.bus.emit(EVENT_AUTHENTICATED, payload).await {
            debug!("Authenticated hook for '{}' reported: {}", socket_id, e);
        }

        // Token envelope: identity, ICE configuration, roster snapshots,
        // and shared fields.
        let mut token = json!({
            "easyrtcid": socket_id,
            "iceConfig": {
                "iceServers": app
                    .get_option(options::APP_ICE_SERVERS)
                    .await
                    .unwrap_or_else(|| json!([])),
            },
            "roomData": conn.generate_room_client_list(RoomStatus::Join, None).await,
            "application": { "applicationName": app.name() },
        });
        if let Some(fields) = app.shared_fields_wire().await {
            token["application"]["field"] = fields;
        }
        if let Some(fields) = conn.shared_fields_wire().await {
            token["field"] = fields;
        }
        if let Some(session) = session {
            token["easyrtcsid"] = json!(session.easyrtcsid());
            token["sessionData"] = session.session_data_wire().await;
        }
        outbound::send(
            &self.state,
            &socket_id,
            OutboundMessage::new("token").with_data(token),
        )
        .await
        .map_err(|_| "LOGIN_NO_SOCKETS")?;

        // Existing occupants learn of the new arrival after the token is
        // out.
        if let Err(e) = conn.emit_room_data_delta(false).await {
            warn!("Post-auth roster delta for '{}' failed: {}", socket_id, e);
        }
        info!("✅ '{}' authenticated into app '{}'", socket_id, app.name());
        Ok(())
    }

    async fn resolve_application(
        &self,
        auth: &AuthRequest,
    ) -> Result<Arc<Application>, &'static str> {
        let app_name = match &auth.application_name {
            Some(name) => name.clone(),
            None => self
                .state
                .option_str(options::APP_DEFAULT_NAME)
                .await
                .ok_or("LOGIN_BAD_APP_NAME")?,
        };
        if let Some(app) = self.state.get_application(&app_name).await {
            return Ok(app);
        }
        if self.state.option_bool(options::APP_AUTO_CREATE_ENABLE).await {
            self.state
                .get_or_create_application(&app_name)
                .await
                .map_err(|_| "LOGIN_APP_AUTH_FAIL")
        } else {
            Err("LOGIN_APP_AUTH_FAIL")
        }
    }

    async fn bind_session(
        &self,
        app: &Arc<Application>,
        conn: &Arc<ClientConnection>,
        auth: &AuthRequest,
    ) -> Result<Option<Arc<crate::state::session::Session>>, &'static str> {
        if !app.option_bool(options::SESSION_ENABLE).await {
            return Ok(None);
        }
        let Some(easyrtcsid) = &auth.easyrtcsid else {
            return Ok(None);
        };
        let session = app
            .get_or_create_session(easyrtcsid)
            .await
            .map_err(|_| "LOGIN_GEN_FAIL")?;
        session.bind(conn.easyrtcid()).await;
        conn.set_easyrtcsid(easyrtcsid).await;
        // Connections already bound to the session see its current fields
        // right away; the binding connection gets them inside the token.
        if session.has_shared_fields().await {
            if let Err(e) = session.emit_session_data_field_update().await {
                debug!(
                    "Session data push for '{}' failed: {}",
                    session.easyrtcsid(),
                    e
                );
            }
        }
        Ok(Some(session))
    }

    async fn join_initial_rooms(
        &self,
        app: &Arc<Application>,
        conn: &Arc<ClientConnection>,
        auth: &AuthRequest,
    ) -> Result<(), &'static str> {
        if let Some(room_join) = &auth.room_join {
            if !room_join.is_empty() {
                for room_name in room_join.keys() {
                    let room = self
                        .resolve_room(app, room_name)
                        .await
                        .ok_or("LOGIN_BAD_ROOM")?;
                    conn.join_room(&room).await.map_err(|_| "LOGIN_BAD_ROOM")?;
                }
                return Ok(());
            }
        }
        if app.option_bool(options::ROOM_DEFAULT_ENABLE).await {
            let room_name = app
                .option_str(options::ROOM_DEFAULT_NAME)
                .await
                .unwrap_or_else(|| "default".to_string());
            let room = app
                .get_or_create_room(&room_name)
                .await
                .map_err(|_| "LOGIN_GEN_FAIL")?;
            conn.join_room(&room).await.map_err(|_| "LOGIN_GEN_FAIL")?;
        }
        Ok(())
    }

    /// Resolves a room by name, creating it when `roomAutoCreateEnable`
    /// allows.
    async fn resolve_room(&self, app: &Arc<Application>, room_name: &str) -> Option<Arc<Room>> {
        if let Some(room) = app.get_room(room_name).await {
            return Some(room);
        }
        if app.option_bool(options::ROOM_AUTO_CREATE_ENABLE).await {
            app.get_or_create_room(room_name).await.ok()
        } else {
            None
        }
    }

    // ---- command channel ----

    async fn handle_command(self: Arc<Self>, payload: EventPayload) -> SignalResult<()> {
        let socket_id = payload.socket_id.clone();
        let Some(env) = payload.envelope else {
            outbound::send_error(&self.state, &socket_id, "MSG_REJECT_BAD_STRUCTURE").await;
            return Ok(());
        };
        let Some((app, conn)) = self.state.find_connection(&socket_id).await else {
            outbound::send_error(&self.state, &socket_id, "MSG_REJECT_NO_AUTH").await;
            return Ok(());
        };
        if !conn.is_authenticated() {
            outbound::send_error(&self.state, &socket_id, "MSG_REJECT_NO_AUTH").await;
            return Ok(());
        }
        if let Err(code) = validation::validate_command(&app, &env).await {
            outbound::send_error(&self.state, &socket_id, code).await;
            return Ok(());
        }

        match env.msg_type.as_str() {
            // Accepted for wire compatibility; no server-side settings are
            // reconfigurable from the client.
            "setUserCfg" => outbound::send_ack(&self.state, &socket_id).await,
            "setPresence" => self.cmd_set_presence(&conn, &env).await,
            "setRoomApiField" => self.cmd_set_room_api_field(&conn, &env).await,
            "roomJoin" => self.cmd_room_join(&app, &conn, &env).await,
            "roomLeave" => self.cmd_room_leave(&conn, &env).await,
            "getIceConfig" => self.cmd_get_ice_config(&app, &socket_id).await,
            "getRoomList" => self.cmd_get_room_list(&app, &socket_id).await,
            relay if RELAY_MSG_TYPES.contains(&relay) => {
                self.cmd_relay(&app, &socket_id, &env).await
            }
            _ => outbound::send_error(&self.state, &socket_id, "MSG_REJECT_BAD_TYPE").await,
        }
        Ok(())
    }

    async fn cmd_set_presence(&self, conn: &Arc<ClientConnection>, env: &ClientEnvelope) {
        let socket_id = conn.easyrtcid().to_string();
        let update: PresenceUpdate = env
            .msg_data
            .as_ref()
            .and_then(|d| d.get("setPresence"))
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .unwrap_or_default();
        if conn.apply_presence(&update).await.is_err() {
            outbound::send_error(&self.state, &socket_id, "MSG_REJECT_PRESENCE").await;
            return;
        }
        // The requester's reply is the same delta the other occupants get.
        match conn.emit_room_data_delta(false).await {
            Ok(entries) if !entries.is_empty() => {
                outbound::send_room_data(&self.state, &socket_id, entries).await;
            }
            Ok(_) => outbound::send_ack(&self.state, &socket_id).await,
            Err(e) => {
                warn!("Presence delta for '{}' failed: {}", socket_id, e);
                outbound::send_ack(&self.state, &socket_id).await;
            }
        }
    }

    async fn cmd_set_room_api_field(&self, conn: &Arc<ClientConnection>, env: &ClientEnvelope) {
        let socket_id = conn.easyrtcid().to_string();
        let Some(request) = env.msg_data.as_ref().and_then(|d| d.get("setRoomApiField")) else {
            outbound::send_error(&self.state, &socket_id, "MSG_REJECT_BAD_STRUCTURE").await;
            return;
        };
        let room_name = request
            .get("roomName")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(junction) = conn.room_junction(room_name).await else {
            outbound::send_error(&self.state, &socket_id, "MSG_REJECT_BAD_ROOM").await;
            return;
        };
        junction
            .set_api_field(request.get("field").cloned().unwrap_or(Value::Null))
            .await;
        // The requester's reply is the same delta the other occupants get.
        match junction.emit_room_data_delta(false).await {
            Ok(entry) => {
                let mut entries = HashMap::new();
                entries.insert(junction.room_name().to_string(), entry);
                outbound::send_room_data(&self.state, &socket_id, entries).await;
            }
            Err(e) => {
                warn!("Api-field delta for '{}' failed: {}", socket_id, e);
                outbound::send_ack(&self.state, &socket_id).await;
            }
        }
    }

    async fn cmd_room_join(
        &self,
        app: &Arc<Application>,
        conn: &Arc<ClientConnection>,
        env: &ClientEnvelope,
    ) {
        let socket_id = conn.easyrtcid().to_string();
        let room_names: Vec<String> = env
            .msg_data
            .as_ref()
            .and_then(|d| d.get("roomJoin"))
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();

        // The whole batch is resolved before any room is entered so a bad
        // name joins nothing.
        let mut resolved = Vec::with_capacity(room_names.len());
        for room_name in &room_names {
            match self.resolve_room(app, room_name).await {
                Some(room) => resolved.push(room),
                None => {
                    outbound::send_error(&self.state, &socket_id, "MSG_REJECT_BAD_ROOM").await;
                    return;
                }
            }
        }
        for room in &resolved {
            if conn.join_room(room).await.is_err() {
                outbound::send_error(&self.state, &socket_id, "MSG_REJECT_BAD_ROOM").await;
                return;
            }
        }

        let entries = conn
            .generate_room_client_list(RoomStatus::Join, Some(room_names.as_slice()))
            .await;
        outbound::send_room_data(&self.state, &socket_id, entries).await;
        if let Err(e) = conn.emit_room_data_delta(false).await {
            warn!("Join delta for '{}' failed: {}", socket_id, e);
        }
    }

    async fn cmd_room_leave(&self, conn: &Arc<ClientConnection>, env: &ClientEnvelope) {
        let socket_id = conn.easyrtcid().to_string();
        let room_names: Vec<String> = env
            .msg_data
            .as_ref()
            .and_then(|d| d.get("roomLeave"))
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();

        let mut junctions = Vec::with_capacity(room_names.len());
        for room_name in &room_names {
            match conn.room_junction(room_name).await {
                Some(junction) => junctions.push(junction),
                None => {
                    outbound::send_error(&self.state, &socket_id, "MSG_REJECT_BAD_ROOM").await;
                    return;
                }
            }
        }
        let mut entries = HashMap::new();
        for junction in junctions {
            let room_name = junction.room_name().to_string();
            if let Err(e) = junction.leave_room().await {
                warn!("Room leave '{}' for '{}' failed: {}", room_name, socket_id, e);
                continue;
            }
            entries.insert(
                room_name.clone(),
                RoomDataEntry {
                    room_name,
                    room_status: RoomStatus::Leave,
                    client_list: None,
                    client_list_delta: None,
                    field: None,
                },
            );
        }
        outbound::send_room_data(&self.state, &socket_id, entries).await;
    }

    async fn cmd_get_ice_config(&self, app: &Arc<Application>, socket_id: &str) {
        let ice_servers = app
            .get_option(options::APP_ICE_SERVERS)
            .await
            .unwrap_or_else(|| json!([]));
        let msg = OutboundMessage::new("iceConfig")
            .with_data(json!({ "iceConfig": { "iceServers": ice_servers } }));
        if let Err(e) = outbound::send(&self.state, socket_id, msg).await {
            debug!("Ice config to '{}' not delivered: {}", socket_id, e);
        }
    }

    async fn cmd_get_room_list(&self, app: &Arc<Application>, socket_id: &str) {
        let mut room_list = serde_json::Map::new();
        for room_name in app.room_names().await {
            let number_clients = match app.get_room(&room_name).await {
                Some(room) => room.occupant_count().await,
                None => continue,
            };
            room_list.insert(
                room_name.clone(),
                json!({ "roomName": room_name, "numberClients": number_clients }),
            );
        }
        let msg = OutboundMessage::new("roomList")
            .with_data(json!({ "roomList": Value::Object(room_list) }));
        if let Err(e) = outbound::send(&self.state, socket_id, msg).await {
            debug!("Room list to '{}' not delivered: {}", socket_id, e);
        }
    }

    /// Relays a WebRTC negotiation message verbatim to its target,
    /// stamping the sender's identity.
    async fn cmd_relay(&self, app: &Arc<Application>, socket_id: &str, env: &ClientEnvelope) {
        let Some(target_id) = env.target_easyrtcid.as_deref() else {
            outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_EASYRTCID").await;
            return;
        };
        let target = match app.get_connection(target_id).await {
            Some(conn) if conn.is_authenticated() && !conn.is_removed() => conn,
            _ => {
                outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_EASYRTCID").await;
                return;
            }
        };
        let mut msg = OutboundMessage::new(&env.msg_type).with_sender(socket_id);
        msg.msg_data = env.msg_data.clone();
        match outbound::send(&self.state, target.easyrtcid(), msg).await {
            Ok(()) => outbound::send_ack(&self.state, socket_id).await,
            Err(e) => {
                debug!("Relay to '{}' failed: {}", target_id, e);
                outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_EASYRTCID").await;
            }
        }
    }

    // ---- application messages ----

    async fn handle_message(self: Arc<Self>, payload: EventPayload) -> SignalResult<()> {
        let socket_id = payload.socket_id.clone();
        let Some(env) = payload.envelope else {
            outbound::send_error(&self.state, &socket_id, "MSG_REJECT_BAD_STRUCTURE").await;
            return Ok(());
        };
        let Some((app, conn)) = self.state.find_connection(&socket_id).await else {
            outbound::send_error(&self.state, &socket_id, "MSG_REJECT_NO_AUTH").await;
            return Ok(());
        };
        if !conn.is_authenticated() {
            outbound::send_error(&self.state, &socket_id, "MSG_REJECT_NO_AUTH").await;
            return Ok(());
        }
        if let Err(code) = validation::validate_message(&app, &env).await {
            outbound::send_error(&self.state, &socket_id, code).await;
            return Ok(());
        }

        if env.target_easyrtcid.is_some() {
            self.msg_to_connection(&app, &socket_id, &env).await;
        } else if env.target_room.is_some() {
            self.msg_to_room(&app, &socket_id, &env).await;
        } else {
            self.msg_to_group(&app, &socket_id, &env).await;
        }
        Ok(())
    }

    fn forward(&self, socket_id: &str, env: &ClientEnvelope) -> OutboundMessage {
        let mut msg = OutboundMessage::new(&env.msg_type).with_sender(socket_id);
        msg.msg_data = env.msg_data.clone();
        msg.target_room = env.target_room.clone();
        msg.target_group = env.target_group.clone();
        msg
    }

    async fn msg_to_connection(
        &self,
        app: &Arc<Application>,
        socket_id: &str,
        env: &ClientEnvelope,
    ) {
        let Some(target_id) = env.target_easyrtcid.as_deref() else {
            return;
        };
        if target_id == socket_id {
            outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_EASYRTCID").await;
            return;
        }
        let target = match app.get_connection(target_id).await {
            Some(conn) if conn.is_authenticated() && !conn.is_removed() => conn,
            _ => {
                outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_EASYRTCID").await;
                return;
            }
        };

        // Destination qualifiers narrow the target: the target must be
        // validated against them at delivery time.
        if let Some(room_name) = &env.target_room {
            let Some(room) = app.get_room(room_name).await else {
                outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_ROOM").await;
                return;
            };
            if !room.contains(socket_id).await || !room.contains(target_id).await {
                outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_ROOM").await;
                return;
            }
        }
        if let Some(group_name) = &env.target_group {
            let Some(group) = app.get_group(group_name).await else {
                outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_GROUP").await;
                return;
            };
            if !group.contains(socket_id).await || !group.contains(target_id).await {
                outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_GROUP").await;
                return;
            }
        }

        match outbound::send(&self.state, target.easyrtcid(), self.forward(socket_id, env)).await
        {
            Ok(()) => outbound::send_ack(&self.state, socket_id).await,
            Err(e) => {
                debug!("Message to '{}' failed: {}", target_id, e);
                outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_EASYRTCID").await;
            }
        }
    }

    async fn msg_to_room(&self, app: &Arc<Application>, socket_id: &str, env: &ClientEnvelope) {
        let Some(room_name) = env.target_room.as_deref() else {
            return;
        };
        let Some(room) = app.get_room(room_name).await else {
            outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_ROOM").await;
            return;
        };
        // The sender must itself occupy the destination room.
        if !room.contains(socket_id).await {
            outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_ROOM").await;
            return;
        }

        let group = match env.target_group.as_deref() {
            Some(group_name) => match app.get_group(group_name).await {
                Some(group) => Some(group),
                None => {
                    outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_GROUP").await;
                    return;
                }
            },
            None => None,
        };

        let mut delivered = 0usize;
        for recipient in room.occupant_ids().await {
            if recipient == socket_id {
                continue;
            }
            if let Some(group) = &group {
                if !group.contains(&recipient).await {
                    continue;
                }
            }
            if let Err(e) =
                outbound::send(&self.state, &recipient, self.forward(socket_id, env)).await
            {
                debug!("Room fan-out to '{}' skipped: {}", recipient, e);
                continue;
            }
            delivered += 1;
        }
        debug!(
            "📨 Message from '{}' to room '{}' delivered to {} recipients",
            socket_id, room_name, delivered
        );
        outbound::send_ack(&self.state, socket_id).await;
    }

    async fn msg_to_group(&self, app: &Arc<Application>, socket_id: &str, env: &ClientEnvelope) {
        let Some(group_name) = env.target_group.as_deref() else {
            return;
        };
        let Some(group) = app.get_group(group_name).await else {
            outbound::send_error(&self.state, socket_id, "MSG_REJECT_TARGET_GROUP").await;
            return;
        };

        let mut delivered = 0usize;
        for recipient in group.member_ids().await {
            if recipient == socket_id {
                continue;
            }
            if let Err(e) =
                outbound::send(&self.state, &recipient, self.forward(socket_id, env)).await
            {
                debug!("Group fan-out to '{}' skipped: {}", recipient, e);
                continue;
            }
            delivered += 1;
        }
        debug!(
            "📨 Message from '{}' to group '{}' delivered to {} recipients",
            socket_id, group_name, delivered
        );
        outbound::send_ack(&self.state, socket_id).await;
    }
}
