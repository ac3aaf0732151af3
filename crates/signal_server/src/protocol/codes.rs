//! Closed catalog of client-facing error codes.
//!
//! Every `error` envelope carries a code from this catalog plus its fixed
//! human-readable text. Requests for an unknown code fall back to a generic
//! message and log a warning, so a typo in a call site never produces an
//! unlisted code silently.

use tracing::warn;

/// Error codes paired with their client-facing text.
pub const ERROR_CODES: &[(&str, &str)] = &[
    ("LOGIN_APP_AUTH_FAIL", "Authentication for application failed. Application requested is not found."),
    ("LOGIN_BAD_APP_NAME", "Provided application name is improper."),
    ("LOGIN_BAD_AUTH", "Authentication for application failed. Login was not approved."),
    ("LOGIN_BAD_ROOM", "Authentication for application failed. Requested room is invalid or does not exist."),
    ("LOGIN_BAD_STRUCTURE", "Authentication for application failed. The provided structure is improper."),
    ("LOGIN_BAD_USER_CFG", "Provided configuration options are improper or invalid."),
    ("LOGIN_GEN_FAIL", "Authentication failed."),
    ("LOGIN_NO_SOCKETS", "No sockets available for account."),
    ("LOGIN_TIMEOUT", "Login has timed out."),
    ("MSG_REJECT_BAD_DATA", "Message rejected. The provided msgData is improper."),
    ("MSG_REJECT_BAD_FIELD", "Message rejected. The provided field name or field value is improper."),
    ("MSG_REJECT_BAD_ROOM", "Message rejected. Requested room is invalid or does not exist."),
    ("MSG_REJECT_BAD_SIZE", "Message rejected. Packet size is too large."),
    ("MSG_REJECT_BAD_STRUCTURE", "Message rejected. The provided structure is improper."),
    ("MSG_REJECT_BAD_TYPE", "Message rejected. The provided msgType is unsupported."),
    ("MSG_REJECT_NO_AUTH", "Message rejected. Not logged in or client not authorized."),
    ("MSG_REJECT_NO_ROOM_LIST", "Message rejected. Room list unavailable."),
    ("MSG_REJECT_PRESENCE", "Message rejected. Presence could not be set."),
    ("MSG_REJECT_TARGET_EASYRTCID", "Message rejected. Target easyrtcid is invalid, not using same application, or no longer online."),
    ("MSG_REJECT_TARGET_GROUP", "Message rejected. Target group is invalid or not defined."),
    ("MSG_REJECT_TARGET_ROOM", "Message rejected. Target room is invalid or not created."),
    ("SERVER_SHUTDOWN", "Server is being shutdown."),
];

/// Returns true when `code` belongs to the catalog.
pub fn is_known_code(code: &str) -> bool {
    ERROR_CODES.iter().any(|(c, _)| *c == code)
}

/// Returns the fixed text for an error code.
///
/// Unknown codes yield a generic message and a logged warning.
pub fn error_text(code: &str) -> &'static str {
    match ERROR_CODES.iter().find(|(c, _)| *c == code) {
        Some((_, text)) => text,
        None => {
            warn!("⚠️ Unknown error code requested: '{}'", code);
            "Error occurred with unknown error code."
        }
    }
}
