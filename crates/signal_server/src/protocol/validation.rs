//! Structural validation of inbound envelopes.
//!
//! Validators return the client-facing error code on failure so handlers
//! can reply with an `error` envelope directly. Pattern options resolve
//! through the application level so per-application overrides apply.

use crate::protocol::types::{
    AuthRequest, ClientEnvelope, PRESENCE_SHOW_VALUES, RELAY_MSG_TYPES,
};
use crate::state::application::Application;
use crate::state::options;
use crate::state::server::ServerState;
use serde_json::Value;

/// Validates an `authenticate` envelope and extracts the request payload.
///
/// Runs against server-level patterns since no application is resolved
/// yet.
pub async fn validate_auth(
    state: &ServerState,
    env: &ClientEnvelope,
) -> Result<AuthRequest, &'static str> {
    if env.msg_type != "authenticate" {
        return Err("LOGIN_BAD_STRUCTURE");
    }
    let Some(msg_data) = &env.msg_data else {
        return Err("LOGIN_BAD_STRUCTURE");
    };
    if !msg_data.is_object() {
        return Err("LOGIN_BAD_STRUCTURE");
    }
    let auth: AuthRequest =
        serde_json::from_value(msg_data.clone()).map_err(|_| "LOGIN_BAD_STRUCTURE")?;

    let Some(api_version) = &auth.api_version else {
        return Err("LOGIN_BAD_STRUCTURE");
    };
    if !state
        .pattern_matches(options::API_VERSION_REG_EXP, api_version)
        .await
    {
        return Err("LOGIN_BAD_STRUCTURE");
    }
    if let Some(app_name) = &auth.application_name {
        if !state
            .pattern_matches(options::APP_NAME_REG_EXP, app_name)
            .await
        {
            return Err("LOGIN_BAD_APP_NAME");
        }
    }
    if let Some(easyrtcsid) = &auth.easyrtcsid {
        if !state
            .pattern_matches(options::EASYRTCSID_REG_EXP, easyrtcsid)
            .await
        {
            return Err("LOGIN_BAD_STRUCTURE");
        }
    }
    if let Some(username) = &auth.username {
        if !state
            .pattern_matches(options::USERNAME_REG_EXP, username)
            .await
        {
            return Err("LOGIN_BAD_STRUCTURE");
        }
    }
    if let Some(presence) = &auth.set_presence {
        if let Some(show) = &presence.show {
            if !PRESENCE_SHOW_VALUES.contains(&show.as_str()) {
                return Err("LOGIN_BAD_STRUCTURE");
            }
        }
    }
    if let Some(room_join) = &auth.room_join {
        for (room_name, request) in room_join {
            if !state
                .pattern_matches(options::ROOM_NAME_REG_EXP, room_name)
                .await
            {
                return Err("LOGIN_BAD_ROOM");
            }
            if let Some(inner_name) = &request.room_name {
                if inner_name != room_name {
                    return Err("LOGIN_BAD_ROOM");
                }
            }
        }
    }
    Ok(auth)
}

/// Validates a command envelope's structure for its subtype.
pub async fn validate_command(app: &Application, env: &ClientEnvelope) -> Result<(), &'static str> {
    if !app
        .pattern_matches(options::MSG_TYPE_REG_EXP, &env.msg_type)
        .await
    {
        return Err("MSG_REJECT_BAD_TYPE");
    }
    match env.msg_type.as_str() {
        "setUserCfg" => {
            if !matches!(&env.msg_data, Some(Value::Object(_))) {
                return Err("MSG_REJECT_BAD_STRUCTURE");
            }
        }
        "setPresence" => {
            let presence = env
                .msg_data
                .as_ref()
                .and_then(|d| d.get("setPresence"))
                .ok_or("MSG_REJECT_BAD_STRUCTURE")?;
            if !presence.is_object() {
                return Err("MSG_REJECT_BAD_STRUCTURE");
            }
            if let Some(show) = presence.get("show").and_then(Value::as_str) {
                if !PRESENCE_SHOW_VALUES.contains(&show) {
                    return Err("MSG_REJECT_PRESENCE");
                }
            }
        }
        "setRoomApiField" => {
            let room_name = env
                .msg_data
                .as_ref()
                .and_then(|d| d.get("setRoomApiField"))
                .and_then(|f| f.get("roomName"))
                .and_then(Value::as_str)
                .ok_or("MSG_REJECT_BAD_STRUCTURE")?;
            if !app
                .pattern_matches(options::ROOM_NAME_REG_EXP, room_name)
                .await
            {
                return Err("MSG_REJECT_BAD_ROOM");
            }
        }
        "roomJoin" | "roomLeave" => {
            let key = env.msg_type.as_str();
            let rooms = env
                .msg_data
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(Value::as_object)
                .ok_or("MSG_REJECT_BAD_STRUCTURE")?;
            if rooms.is_empty() {
                return Err("MSG_REJECT_BAD_STRUCTURE");
            }
            for room_name in rooms.keys() {
                if !app
                    .pattern_matches(options::ROOM_NAME_REG_EXP, room_name)
                    .await
                {
                    return Err("MSG_REJECT_BAD_ROOM");
                }
            }
        }
        relay if RELAY_MSG_TYPES.contains(&relay) => {
            let target = env
                .target_easyrtcid
                .as_deref()
                .ok_or("MSG_REJECT_TARGET_EASYRTCID")?;
            if !app
                .pattern_matches(options::EASYRTCID_REG_EXP, target)
                .await
            {
                return Err("MSG_REJECT_TARGET_EASYRTCID");
            }
        }
        "getIceConfig" | "getRoomList" => {}
        _ => return Err("MSG_REJECT_BAD_TYPE"),
    }
    Ok(())
}

/// Validates an application-message envelope's structure.
pub async fn validate_message(app: &Application, env: &ClientEnvelope) -> Result<(), &'static str> {
    if !app
        .pattern_matches(options::MSG_TYPE_REG_EXP, &env.msg_type)
        .await
    {
        return Err("MSG_REJECT_BAD_TYPE");
    }
    if env.msg_data.is_none() {
        return Err("MSG_REJECT_BAD_DATA");
    }
    if !env.has_destination() {
        return Err("MSG_REJECT_BAD_STRUCTURE");
    }
    if let Some(target) = &env.target_easyrtcid {
        if !app
            .pattern_matches(options::EASYRTCID_REG_EXP, target)
            .await
        {
            return Err("MSG_REJECT_TARGET_EASYRTCID");
        }
    }
    if let Some(room_name) = &env.target_room {
        if !app
            .pattern_matches(options::ROOM_NAME_REG_EXP, room_name)
            .await
        {
            return Err("MSG_REJECT_TARGET_ROOM");
        }
    }
    if let Some(group_name) = &env.target_group {
        if !app
            .pattern_matches(options::GROUP_NAME_REG_EXP, group_name)
            .await
        {
            return Err("MSG_REJECT_TARGET_GROUP");
        }
    }
    Ok(())
}
