//! Closed option catalog, defaults, and pattern matching.
//!
//! Options form a closed set: every option name is declared here with its
//! default value, and setting an unknown name is refused at every level.
//! Lookups resolve with fallback (room to application to server), so the
//! server-level map is the only one seeded with defaults.

use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

/// Whether applications may be created implicitly during authentication.
pub const APP_AUTO_CREATE_ENABLE: &str = "appAutoCreateEnable";
/// Default fields applied to every new application.
pub const APP_DEFAULT_FIELD_OBJ: &str = "appDefaultFieldObj";
/// Application name used when an auth request names none.
pub const APP_DEFAULT_NAME: &str = "appDefaultName";
/// ICE server list returned by the getIceConfig command.
pub const APP_ICE_SERVERS: &str = "appIceServers";
/// Pattern an application name must match.
pub const APP_NAME_REG_EXP: &str = "appNameRegExp";
/// Pattern a client apiVersion must match.
pub const API_VERSION_REG_EXP: &str = "apiVersionRegExp";
/// Default fields applied to every new connection.
pub const CONNECTION_DEFAULT_FIELD_OBJ: &str = "connectionDefaultFieldObj";
/// Pattern a connection identifier must match.
pub const EASYRTCID_REG_EXP: &str = "easyrtcidRegExp";
/// Pattern a session identifier must match.
pub const EASYRTCSID_REG_EXP: &str = "easyrtcsidRegExp";
/// Pattern a field name must match.
pub const FIELD_NAME_REG_EXP: &str = "fieldNameRegExp";
/// Pattern a group name must match.
pub const GROUP_NAME_REG_EXP: &str = "groupNameRegExp";
/// Pattern a message type must match.
pub const MSG_TYPE_REG_EXP: &str = "msgTypeRegExp";
/// Pattern an option name must match.
pub const OPTION_NAME_REG_EXP: &str = "optionNameRegExp";
/// Whether rooms may be created implicitly on join.
pub const ROOM_AUTO_CREATE_ENABLE: &str = "roomAutoCreateEnable";
/// Whether clients that request no room are placed in the default room.
pub const ROOM_DEFAULT_ENABLE: &str = "roomDefaultEnable";
/// Default fields applied to every new room.
pub const ROOM_DEFAULT_FIELD_OBJ: &str = "roomDefaultFieldObj";
/// Name of the default room.
pub const ROOM_DEFAULT_NAME: &str = "roomDefaultName";
/// Pattern a room name must match.
pub const ROOM_NAME_REG_EXP: &str = "roomNameRegExp";
/// Whether sessions are tracked for authenticated connections.
pub const SESSION_ENABLE: &str = "sessionEnable";
/// Pattern a username must match.
pub const USERNAME_REG_EXP: &str = "usernameRegExp";

/// All option names in the closed catalog.
pub const OPTION_NAMES: &[&str] = &[
    APP_AUTO_CREATE_ENABLE,
    APP_DEFAULT_FIELD_OBJ,
    APP_DEFAULT_NAME,
    APP_ICE_SERVERS,
    APP_NAME_REG_EXP,
    API_VERSION_REG_EXP,
    CONNECTION_DEFAULT_FIELD_OBJ,
    EASYRTCID_REG_EXP,
    EASYRTCSID_REG_EXP,
    FIELD_NAME_REG_EXP,
    GROUP_NAME_REG_EXP,
    MSG_TYPE_REG_EXP,
    OPTION_NAME_REG_EXP,
    ROOM_AUTO_CREATE_ENABLE,
    ROOM_DEFAULT_ENABLE,
    ROOM_DEFAULT_FIELD_OBJ,
    ROOM_DEFAULT_NAME,
    ROOM_NAME_REG_EXP,
    SESSION_ENABLE,
    USERNAME_REG_EXP,
];

/// Returns true when `name` belongs to the closed option catalog.
pub fn is_known_option(name: &str) -> bool {
    OPTION_NAMES.contains(&name)
}

/// Builds the server-level option map seeded with catalog defaults.
pub fn default_options() -> HashMap<String, Value> {
    let mut options = HashMap::new();
    options.insert(APP_AUTO_CREATE_ENABLE.to_string(), json!(true));
    options.insert(APP_DEFAULT_FIELD_OBJ.to_string(), Value::Null);
    options.insert(APP_DEFAULT_NAME.to_string(), json!("default"));
    options.insert(
        APP_ICE_SERVERS.to_string(),
        json!([{ "urls": "stun:stun.l.google.com:19302" }]),
    );
    options.insert(
        APP_NAME_REG_EXP.to_string(),
        json!("(?i)^[a-z0-9_.-]{1,32}$"),
    );
    options.insert(
        API_VERSION_REG_EXP.to_string(),
        json!("(?i)^[a-z0-9_.+-]{1,32}$"),
    );
    options.insert(CONNECTION_DEFAULT_FIELD_OBJ.to_string(), Value::Null);
    options.insert(
        EASYRTCID_REG_EXP.to_string(),
        json!("(?i)^[a-z0-9_.-]{1,32}$"),
    );
    options.insert(
        EASYRTCSID_REG_EXP.to_string(),
        json!("(?i)^[a-z0-9_.-]{1,64}$"),
    );
    options.insert(
        FIELD_NAME_REG_EXP.to_string(),
        json!("(?i)^[a-z0-9_. -]{1,32}$"),
    );
    options.insert(
        GROUP_NAME_REG_EXP.to_string(),
        json!("(?i)^[a-z0-9_.-]{1,32}$"),
    );
    options.insert(
        MSG_TYPE_REG_EXP.to_string(),
        json!("(?i)^[a-z0-9_.-]{1,32}$"),
    );
    options.insert(
        OPTION_NAME_REG_EXP.to_string(),
        json!("(?i)^[a-z0-9_. -]{1,32}$"),
    );
    options.insert(ROOM_AUTO_CREATE_ENABLE.to_string(), json!(true));
    options.insert(ROOM_DEFAULT_ENABLE.to_string(), json!(true));
    options.insert(ROOM_DEFAULT_FIELD_OBJ.to_string(), Value::Null);
    options.insert(ROOM_DEFAULT_NAME.to_string(), json!("default"));
    options.insert(
        ROOM_NAME_REG_EXP.to_string(),
        json!("(?i)^[a-z0-9_.-]{1,32}$"),
    );
    options.insert(SESSION_ENABLE.to_string(), json!(true));
    options.insert(USERNAME_REG_EXP.to_string(), json!("^(.){1,64}$"));
    options
}

fn pattern_cache() -> &'static dashmap::DashMap<String, Regex> {
    static CACHE: OnceLock<dashmap::DashMap<String, Regex>> = OnceLock::new();
    CACHE.get_or_init(dashmap::DashMap::new)
}

/// Tests `candidate` against a regular expression pattern string.
///
/// Compiled patterns are cached process-wide since the catalog patterns
/// rarely change after startup. An invalid pattern rejects every candidate
/// and logs a warning rather than panicking.
pub fn pattern_matches(pattern: &str, candidate: &str) -> bool {
    if let Some(regex) = pattern_cache().get(pattern) {
        return regex.is_match(candidate);
    }
    match Regex::new(pattern) {
        Ok(regex) => {
            let matched = regex.is_match(candidate);
            pattern_cache().insert(pattern.to_string(), regex);
            matched
        }
        Err(e) => {
            warn!("⚠️ Invalid option pattern '{}': {}", pattern, e);
            false
        }
    }
}
