//! Integration tests driving the protocol through the event bus.
//!
//! Tests inject a recording sender in place of the WebSocket transport, so
//! every outbound envelope can be inspected as parsed JSON.

use crate::protocol::router::{EVENT_AUTH, EVENT_AUTHENTICATE, EVENT_CMD, EVENT_DISCONNECT, EVENT_MSG};
use crate::protocol::types::ClientEnvelope;
use crate::protocol::EventPayload;
use crate::server::SignalServer;
use crate::utils::create_server;
use serde_json::{json, Value};
use signal_events::{ClientSender, EventError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Captures every outbound envelope instead of writing to sockets.
#[derive(Debug, Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, Value)>>,
    kicked: Mutex<Vec<String>>,
}

impl RecordingSender {
    async fn sent_to(&self, easyrtcid: &str) -> Vec<Value> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(id, _)| id == easyrtcid)
            .map(|(_, v)| v.clone())
            .collect()
    }

    async fn find(&self, easyrtcid: &str, msg_type: &str) -> Option<Value> {
        self.sent_to(easyrtcid)
            .await
            .into_iter()
            .find(|v| v["msgType"] == msg_type)
    }

    async fn error_codes_for(&self, easyrtcid: &str) -> Vec<String> {
        self.sent_to(easyrtcid)
            .await
            .into_iter()
            .filter(|v| v["msgType"] == "error")
            .filter_map(|v| v["msgData"]["errorCode"].as_str().map(String::from))
            .collect()
    }

    async fn was_kicked(&self, easyrtcid: &str) -> bool {
        self.kicked.lock().await.iter().any(|id| id == easyrtcid)
    }

    async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

impl ClientSender for RecordingSender {
    fn send_to_client(
        &self,
        easyrtcid: &str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        let easyrtcid = easyrtcid.to_string();
        Box::pin(async move {
            let value: Value =
                serde_json::from_slice(&data).map_err(|e| format!("bad payload: {e}"))?;
            self.sent.lock().await.push((easyrtcid, value));
            Ok(())
        })
    }

    fn is_connection_active(
        &self,
        _easyrtcid: &str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async { true })
    }

    fn kick(
        &self,
        easyrtcid: &str,
        _reason: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        let easyrtcid = easyrtcid.to_string();
        Box::pin(async move {
            self.kicked.lock().await.push(easyrtcid);
            Ok(())
        })
    }
}

async fn setup() -> (SignalServer, Arc<RecordingSender>) {
    let server = create_server("127.0.0.1:0".parse().unwrap());
    let sender = Arc::new(RecordingSender::default());
    server.state().set_client_sender(sender.clone()).await;
    (server, sender)
}

fn auth_envelope(app_name: Option<&str>, rooms: &[&str]) -> ClientEnvelope {
    let mut msg_data = json!({ "apiVersion": "1.1.0" });
    if let Some(name) = app_name {
        msg_data["applicationName"] = json!(name);
    }
    if !rooms.is_empty() {
        let mut room_join = serde_json::Map::new();
        for room in rooms {
            room_join.insert(room.to_string(), json!({ "roomName": room }));
        }
        msg_data["roomJoin"] = Value::Object(room_join);
    }
    ClientEnvelope {
        msg_type: "authenticate".to_string(),
        msg_data: Some(msg_data),
        ..Default::default()
    }
}

fn command(msg_type: &str, msg_data: Value) -> ClientEnvelope {
    ClientEnvelope {
        msg_type: msg_type.to_string(),
        msg_data: Some(msg_data),
        ..Default::default()
    }
}

async fn emit(server: &SignalServer, topic: &str, easyrtcid: &str, env: ClientEnvelope) {
    server
        .bus()
        .emit(topic, EventPayload::with_envelope(easyrtcid, env))
        .await
        .expect("emit should succeed");
}

async fn authenticate(server: &SignalServer, easyrtcid: &str, rooms: &[&str]) {
    emit(server, EVENT_AUTH, easyrtcid, auth_envelope(None, rooms)).await;
}

// ---- authentication ----

#[tokio::test(flavor = "multi_thread")]
async fn auth_creates_connection_and_sends_token() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &[]).await;

    let token = sender.find("alice", "token").await.expect("token sent");
    assert_eq!(token["easyrtcid"], "alice");
    assert_eq!(token["msgData"]["easyrtcid"], "alice");
    assert!(token["serverTime"].as_u64().is_some());
    // Default room snapshot with the new arrival listed.
    let room_data = &token["msgData"]["roomData"]["default"];
    assert_eq!(room_data["roomStatus"], "join");
    assert!(room_data["clientList"]["alice"].is_object());

    let (_, conn) = server
        .state()
        .find_connection("alice")
        .await
        .expect("connection registered");
    assert!(conn.is_authenticated());
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_joins_requested_rooms_instead_of_default() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby", "arena"]).await;

    let token = sender.find("alice", "token").await.expect("token sent");
    let room_data = &token["msgData"]["roomData"];
    assert!(room_data["lobby"].is_object());
    assert!(room_data["arena"].is_object());
    assert!(room_data["default"].is_null());
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_missing_api_version_is_rejected() {
    let (server, sender) = setup().await;
    let env = ClientEnvelope {
        msg_type: "authenticate".to_string(),
        msg_data: Some(json!({ "applicationName": "default" })),
        ..Default::default()
    };
    emit(&server, EVENT_AUTH, "alice", env).await;

    assert_eq!(
        sender.error_codes_for("alice").await,
        vec!["LOGIN_BAD_STRUCTURE"]
    );
    assert!(sender.was_kicked("alice").await);
    assert!(server.state().find_connection("alice").await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn reauthentication_is_rejected() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &[]).await;
    sender.clear().await;

    authenticate(&server, "alice", &[]).await;
    assert_eq!(sender.error_codes_for("alice").await, vec!["LOGIN_BAD_AUTH"]);
    // The established session survives the rejected retry.
    assert!(!sender.was_kicked("alice").await);
    let (_, conn) = server.state().find_connection("alice").await.unwrap();
    assert!(conn.is_authenticated());
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_fails_for_unknown_app_when_auto_create_disabled() {
    let (server, sender) = setup().await;
    server
        .state()
        .set_option("appAutoCreateEnable", json!(false))
        .await
        .unwrap();

    emit(
        &server,
        EVENT_AUTH,
        "alice",
        auth_envelope(Some("ghost_app"), &[]),
    )
    .await;
    assert_eq!(
        sender.error_codes_for("alice").await,
        vec!["LOGIN_APP_AUTH_FAIL"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn credential_hook_override_vetoes_and_default_restores() {
    let (server, sender) = setup().await;
    server.bus().on(
        EVENT_AUTHENTICATE,
        Arc::new(|_payload| {
            Box::pin(async { Err(EventError::ListenerExecution("denied".to_string())) })
        }),
    );
    authenticate(&server, "alice", &[]).await;
    assert_eq!(sender.error_codes_for("alice").await, vec!["LOGIN_BAD_AUTH"]);

    sender.clear().await;
    server.bus().set_default_listener(EVENT_AUTHENTICATE).unwrap();
    authenticate(&server, "bob", &[]).await;
    assert!(sender.find("bob", "token").await.is_some());
}

// ---- roster deltas ----

#[tokio::test(flavor = "multi_thread")]
async fn arrival_notifies_existing_occupants() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    sender.clear().await;

    authenticate(&server, "bob", &["lobby"]).await;
    let update = sender.find("alice", "roomData").await.expect("delta sent");
    let delta = &update["msgData"]["roomData"]["lobby"]["clientListDelta"];
    assert!(delta["updateClient"]["bob"].is_object());
    // The arriving client gets the snapshot inside the token, not a delta.
    assert!(sender.find("bob", "roomData").await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn set_presence_broadcasts_to_shared_rooms() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "bob", &["lobby"]).await;
    sender.clear().await;

    emit(
        &server,
        EVENT_CMD,
        "bob",
        command("setPresence", json!({ "setPresence": { "show": "away", "status": "brb" } })),
    )
    .await;

    let update = sender.find("alice", "roomData").await.expect("delta sent");
    let entry = &update["msgData"]["roomData"]["lobby"]["clientListDelta"]["updateClient"]["bob"];
    assert_eq!(entry["presence"]["show"], "away");
    assert_eq!(entry["presence"]["status"], "brb");

    // The requester's reply carries the same delta, not a bare ack.
    let reply = sender.find("bob", "roomData").await.expect("reply sent");
    let own = &reply["msgData"]["roomData"]["lobby"]["clientListDelta"]["updateClient"]["bob"];
    assert_eq!(own["presence"]["show"], "away");
}

#[tokio::test(flavor = "multi_thread")]
async fn set_presence_with_invalid_show_is_rejected() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &[]).await;
    sender.clear().await;

    emit(
        &server,
        EVENT_CMD,
        "alice",
        command("setPresence", json!({ "setPresence": { "show": "invisible" } })),
    )
    .await;
    assert_eq!(
        sender.error_codes_for("alice").await,
        vec!["MSG_REJECT_PRESENCE"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn set_room_api_field_appears_in_deltas() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "bob", &["lobby"]).await;
    sender.clear().await;

    emit(
        &server,
        EVENT_CMD,
        "bob",
        command(
            "setRoomApiField",
            json!({ "setRoomApiField": { "roomName": "lobby", "field": { "hand": "raised" } } }),
        ),
    )
    .await;

    let update = sender.find("alice", "roomData").await.expect("delta sent");
    let entry = &update["msgData"]["roomData"]["lobby"]["clientListDelta"]["updateClient"]["bob"];
    assert_eq!(entry["apiField"]["hand"], "raised");

    // The requester's reply carries the same delta, not a bare ack.
    let reply = sender.find("bob", "roomData").await.expect("reply sent");
    let own = &reply["msgData"]["roomData"]["lobby"]["clientListDelta"]["updateClient"]["bob"];
    assert_eq!(own["apiField"]["hand"], "raised");
}

#[tokio::test(flavor = "multi_thread")]
async fn room_leave_broadcasts_removal() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "bob", &["lobby"]).await;
    sender.clear().await;

    emit(
        &server,
        EVENT_CMD,
        "bob",
        command("roomLeave", json!({ "roomLeave": { "lobby": {} } })),
    )
    .await;

    let update = sender.find("alice", "roomData").await.expect("removal sent");
    let delta = &update["msgData"]["roomData"]["lobby"]["clientListDelta"];
    assert!(delta["removeClient"]["bob"].is_object());

    let leave = sender.find("bob", "roomData").await.expect("leave reply");
    assert_eq!(leave["msgData"]["roomData"]["lobby"]["roomStatus"], "leave");

    let (app, _) = server.state().find_connection("alice").await.unwrap();
    let room = app.get_room("lobby").await.unwrap();
    assert!(!room.contains("bob").await);
}

#[tokio::test(flavor = "multi_thread")]
async fn room_join_batch_fails_atomically_on_bad_room() {
    let (server, sender) = setup().await;
    server
        .state()
        .set_option("roomAutoCreateEnable", json!(false))
        .await
        .unwrap();
    authenticate(&server, "alice", &[]).await;
    let (app, conn) = server.state().find_connection("alice").await.unwrap();
    app.create_room("existing", None).await.unwrap();
    sender.clear().await;

    emit(
        &server,
        EVENT_CMD,
        "alice",
        command(
            "roomJoin",
            json!({ "roomJoin": { "existing": {}, "missing": {} } }),
        ),
    )
    .await;

    assert_eq!(
        sender.error_codes_for("alice").await,
        vec!["MSG_REJECT_BAD_ROOM"]
    );
    assert!(!conn.occupied_room_names().await.contains(&"existing".to_string()));
}

// ---- queries ----

#[tokio::test(flavor = "multi_thread")]
async fn get_ice_config_returns_configured_servers() {
    let (server, sender) = setup().await;
    server
        .state()
        .set_option("appIceServers", json!([{ "urls": "turn:turn.example.com" }]))
        .await
        .unwrap();
    authenticate(&server, "alice", &[]).await;
    sender.clear().await;

    emit(&server, EVENT_CMD, "alice", command("getIceConfig", json!({}))).await;
    let reply = sender.find("alice", "iceConfig").await.expect("reply sent");
    assert_eq!(
        reply["msgData"]["iceConfig"]["iceServers"][0]["urls"],
        "turn:turn.example.com"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn get_room_list_reports_occupancy() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "bob", &["lobby"]).await;
    sender.clear().await;

    emit(&server, EVENT_CMD, "alice", command("getRoomList", json!({}))).await;
    let reply = sender.find("alice", "roomList").await.expect("reply sent");
    assert_eq!(reply["msgData"]["roomList"]["lobby"]["numberClients"], 2);
}

// ---- WebRTC relay ----

#[tokio::test(flavor = "multi_thread")]
async fn offer_is_relayed_with_sender_identity() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "bob", &["lobby"]).await;
    sender.clear().await;

    let env = ClientEnvelope {
        msg_type: "offer".to_string(),
        target_easyrtcid: Some("bob".to_string()),
        msg_data: Some(json!({ "sdp": "v=0" })),
        ..Default::default()
    };
    emit(&server, EVENT_CMD, "alice", env).await;

    let relayed = sender.find("bob", "offer").await.expect("offer relayed");
    assert_eq!(relayed["senderEasyrtcid"], "alice");
    assert_eq!(relayed["msgData"]["sdp"], "v=0");
    assert!(sender.find("alice", "ack").await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn relay_to_unknown_target_is_rejected() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &[]).await;
    sender.clear().await;

    let env = ClientEnvelope {
        msg_type: "candidate".to_string(),
        target_easyrtcid: Some("nobody".to_string()),
        msg_data: Some(json!({ "candidate": "..." })),
        ..Default::default()
    };
    emit(&server, EVENT_CMD, "alice", env).await;
    assert_eq!(
        sender.error_codes_for("alice").await,
        vec!["MSG_REJECT_TARGET_EASYRTCID"]
    );
}

// ---- application messages ----

#[tokio::test(flavor = "multi_thread")]
async fn room_message_reaches_other_occupants_only() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "bob", &["lobby"]).await;
    authenticate(&server, "carol", &["other"]).await;
    sender.clear().await;

    let env = ClientEnvelope {
        msg_type: "chat".to_string(),
        target_room: Some("lobby".to_string()),
        msg_data: Some(json!({ "text": "hello" })),
        ..Default::default()
    };
    emit(&server, EVENT_MSG, "alice", env).await;

    let delivered = sender.find("bob", "chat").await.expect("delivered");
    assert_eq!(delivered["senderEasyrtcid"], "alice");
    assert_eq!(delivered["targetRoom"], "lobby");
    assert!(sender.find("carol", "chat").await.is_none());
    assert!(sender.find("alice", "chat").await.is_none());
    assert!(sender.find("alice", "ack").await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn room_message_requires_sender_membership() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "mallory", &["other"]).await;
    sender.clear().await;

    let env = ClientEnvelope {
        msg_type: "chat".to_string(),
        target_room: Some("lobby".to_string()),
        msg_data: Some(json!({ "text": "hi" })),
        ..Default::default()
    };
    emit(&server, EVENT_MSG, "mallory", env).await;
    assert_eq!(
        sender.error_codes_for("mallory").await,
        vec!["MSG_REJECT_TARGET_ROOM"]
    );
    assert!(sender.find("alice", "chat").await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn room_and_group_targets_intersect() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "bob", &["lobby"]).await;
    authenticate(&server, "carol", &["lobby"]).await;
    let (app, _) = server.state().find_connection("alice").await.unwrap();
    let group = app.create_group("vip").await.unwrap();
    group.add_member("bob").await;
    sender.clear().await;

    let env = ClientEnvelope {
        msg_type: "announce".to_string(),
        target_room: Some("lobby".to_string()),
        target_group: Some("vip".to_string()),
        msg_data: Some(json!({ "text": "vips only" })),
        ..Default::default()
    };
    emit(&server, EVENT_MSG, "alice", env).await;

    assert!(sender.find("bob", "announce").await.is_some());
    assert!(sender.find("carol", "announce").await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn group_qualified_message_requires_sender_membership() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "bob", &["lobby"]).await;
    let (app, _) = server.state().find_connection("alice").await.unwrap();
    let group = app.create_group("vip").await.unwrap();
    group.add_member("bob").await;
    sender.clear().await;

    let env = ClientEnvelope {
        msg_type: "note".to_string(),
        target_easyrtcid: Some("bob".to_string()),
        target_group: Some("vip".to_string()),
        msg_data: Some(json!({ "text": "psst" })),
        ..Default::default()
    };
    emit(&server, EVENT_MSG, "alice", env.clone()).await;
    assert_eq!(
        sender.error_codes_for("alice").await,
        vec!["MSG_REJECT_TARGET_GROUP"]
    );
    assert!(sender.find("bob", "note").await.is_none());

    // Once both ends belong to the group the message goes through.
    group.add_member("alice").await;
    sender.clear().await;
    emit(&server, EVENT_MSG, "alice", env).await;
    assert!(sender.find("bob", "note").await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn self_targeted_message_is_rejected() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &[]).await;
    sender.clear().await;

    let env = ClientEnvelope {
        msg_type: "note".to_string(),
        target_easyrtcid: Some("alice".to_string()),
        msg_data: Some(json!({})),
        ..Default::default()
    };
    emit(&server, EVENT_MSG, "alice", env).await;
    assert_eq!(
        sender.error_codes_for("alice").await,
        vec!["MSG_REJECT_TARGET_EASYRTCID"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_type_without_destination_is_rejected() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &[]).await;
    sender.clear().await;

    emit(&server, EVENT_CMD, "alice", command("mystery", json!({}))).await;
    assert_eq!(
        sender.error_codes_for("alice").await,
        vec!["MSG_REJECT_BAD_TYPE"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthenticated_command_is_rejected() {
    let (server, sender) = setup().await;
    emit(&server, EVENT_CMD, "stranger", command("getRoomList", json!({}))).await;
    assert_eq!(
        sender.error_codes_for("stranger").await,
        vec!["MSG_REJECT_NO_AUTH"]
    );
}

// ---- disconnect and zombies ----

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_cleans_state_and_notifies_occupants() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    authenticate(&server, "bob", &["lobby"]).await;
    sender.clear().await;

    server
        .bus()
        .emit(EVENT_DISCONNECT, EventPayload::lifecycle("bob"))
        .await
        .unwrap();

    let update = sender.find("alice", "roomData").await.expect("removal sent");
    let delta = &update["msgData"]["roomData"]["lobby"]["clientListDelta"];
    assert!(delta["removeClient"]["bob"].is_object());
    assert!(server.state().find_connection("bob").await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn zombie_connection_cannot_rejoin_rooms() {
    let (server, _sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    let (app, conn) = server.state().find_connection("alice").await.unwrap();
    let room = app.get_room("lobby").await.unwrap();

    conn.disconnect().await.unwrap();
    assert!(conn.is_removed());
    let err = conn.join_room(&room).await.unwrap_err();
    assert!(err.is_warning());
}

// ---- state registry ----

#[tokio::test(flavor = "multi_thread")]
async fn options_fall_back_room_to_app_to_server() {
    let (server, _sender) = setup().await;
    let state = server.state();
    let app = state.get_or_create_application("default").await.unwrap();
    let room = app.get_or_create_room("lobby").await.unwrap();

    // Server default resolves through both levels.
    assert_eq!(room.get_option("roomDefaultName").await, Some(json!("default")));

    app.set_option("roomDefaultName", json!("app_level")).await.unwrap();
    assert_eq!(room.get_option("roomDefaultName").await, Some(json!("app_level")));

    room.set_option("roomDefaultName", json!("room_level")).await.unwrap();
    assert_eq!(room.get_option("roomDefaultName").await, Some(json!("room_level")));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_option_names_are_refused_everywhere() {
    let (server, _sender) = setup().await;
    let state = server.state();
    assert!(state.set_option("bogusOption", json!(1)).await.is_err());

    let app = state.get_or_create_application("default").await.unwrap();
    assert!(app.set_option("bogusOption", json!(1)).await.is_err());

    let room = app.get_or_create_room("lobby").await.unwrap();
    assert!(room.set_option("bogusOption", json!(1)).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_room_creation_yields_one_instance() {
    let (server, _sender) = setup().await;
    let app = server
        .state()
        .get_or_create_application("default")
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        app.get_or_create_room("shared"),
        app.get_or_create_room("shared"),
    );
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_room_join_returns_existing_junction() {
    let (server, _sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    let (app, conn) = server.state().find_connection("alice").await.unwrap();
    let room = app.get_room("lobby").await.unwrap();
    let first = conn.room_junction("lobby").await.unwrap();

    let second = conn.join_room(&room).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(room.occupant_count().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn field_sharing_controls_wire_visibility() {
    let (server, _sender) = setup().await;
    let app = server
        .state()
        .get_or_create_application("default")
        .await
        .unwrap();
    app.set_field("motd", json!("welcome"), true).await.unwrap();
    app.set_field("billing_tier", json!("gold"), false).await.unwrap();

    let shared = app.get_fields(true).await;
    assert_eq!(shared["motd"]["fieldValue"], "welcome");
    assert!(!shared.contains_key("billing_tier"));

    let all = app.get_fields(false).await;
    assert_eq!(all["motd"]["fieldValue"], "welcome");
    assert_eq!(all["billing_tier"]["fieldValue"], "gold");
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_field_name_leaves_store_unmodified() {
    let (server, _sender) = setup().await;
    let app = server
        .state()
        .get_or_create_application("default")
        .await
        .unwrap();

    let err = app.set_field("bad!name", json!(1), true).await.unwrap_err();
    assert!(err.is_warning());
    assert!(app.get_field("bad!name").await.is_none());
    assert!(app.get_fields(false).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_room_refuses_occupied_rooms() {
    let (server, _sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    let (app, conn) = server.state().find_connection("alice").await.unwrap();

    assert!(app.delete_room("lobby").await.is_err());
    assert!(app.delete_room("missing").await.is_err());

    let junction = conn.room_junction("lobby").await.unwrap();
    junction.leave_room().await.unwrap();
    app.delete_room("lobby").await.unwrap();
    assert!(!app.is_room("lobby").await);
}

#[tokio::test(flavor = "multi_thread")]
async fn error_code_catalog_is_closed() {
    use crate::protocol::codes;
    assert!(codes::is_known_code("MSG_REJECT_NO_AUTH"));
    assert!(!codes::is_known_code("MSG_REJECT_MADE_UP"));
    assert_eq!(
        codes::error_text("MSG_REJECT_MADE_UP"),
        "Error occurred with unknown error code."
    );
    assert_ne!(codes::error_text("LOGIN_BAD_AUTH"), "");
}

// ---- sessions ----

#[tokio::test(flavor = "multi_thread")]
async fn session_fields_push_to_all_bound_connections() {
    let (server, sender) = setup().await;
    for id in ["alice", "alice2"] {
        let env = ClientEnvelope {
            msg_type: "authenticate".to_string(),
            msg_data: Some(json!({ "apiVersion": "1.1.0", "easyrtcsid": "sess1" })),
            ..Default::default()
        };
        emit(&server, EVENT_AUTH, id, env).await;
    }
    let token = sender.find("alice", "token").await.expect("token sent");
    assert_eq!(token["msgData"]["easyrtcsid"], "sess1");
    sender.clear().await;

    let (app, _) = server.state().find_connection("alice").await.unwrap();
    let session = app.get_session("sess1").await.expect("session exists");
    session
        .set_field("team", json!("red"), true)
        .await
        .unwrap();

    for id in ["alice", "alice2"] {
        let push = sender.find(id, "sessionData").await.expect("push sent");
        let field = &push["msgData"]["sessionData"]["field"]["team"];
        assert_eq!(field["fieldValue"], "red");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn username_is_broadcast_in_rosters() {
    let (server, sender) = setup().await;
    authenticate(&server, "alice", &["lobby"]).await;
    sender.clear().await;

    let env = ClientEnvelope {
        msg_type: "authenticate".to_string(),
        msg_data: Some(json!({
            "apiVersion": "1.1.0",
            "username": "Bob the Builder",
            "roomJoin": { "lobby": { "roomName": "lobby" } },
        })),
        ..Default::default()
    };
    emit(&server, EVENT_AUTH, "bob", env).await;

    let update = sender.find("alice", "roomData").await.expect("delta sent");
    let entry = &update["msgData"]["roomData"]["lobby"]["clientListDelta"]["updateClient"]["bob"];
    assert_eq!(entry["username"], "Bob the Builder");

    let (app, _) = server.state().find_connection("bob").await.unwrap();
    assert_eq!(
        app.ids_for_username("Bob the Builder").await,
        vec!["bob".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shared_room_fields_appear_in_join_snapshots() {
    let (server, sender) = setup().await;
    let app = server
        .state()
        .get_or_create_application("default")
        .await
        .unwrap();
    let room = app.get_or_create_room("lobby").await.unwrap();
    room.set_field("topic", json!("standup"), true).await.unwrap();
    room.set_field("secret", json!("hidden"), false).await.unwrap();

    authenticate(&server, "alice", &["lobby"]).await;
    let token = sender.find("alice", "token").await.expect("token sent");
    let field = &token["msgData"]["roomData"]["lobby"]["field"];
    assert_eq!(field["topic"]["fieldValue"], "standup");
    assert!(field["secret"].is_null());
}
