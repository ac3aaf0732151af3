//! Sessions shared by connections that present the same easyrtcsid.
//!
//! A session outlives the connections bound to it and carries fields that
//! are pushed to every bound connection whenever one changes.

use crate::error::{SignalError, SignalResult};
use crate::protocol::outbound::{self, OutboundMessage};
use crate::state::application::Application;
use crate::state::field::{Field, FieldMap};
use crate::state::options;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::debug;

/// A session identified by easyrtcsid within one application.
#[derive(Debug)]
pub struct Session {
    easyrtcsid: String,
    app: Weak<Application>,
    /// Session fields, pushed to bound connections on change.
    fields: RwLock<FieldMap>,
    /// Currently bound connection identifiers.
    connections: RwLock<HashSet<String>>,
}

impl Session {
    pub(crate) fn new(easyrtcsid: &str, app: Weak<Application>) -> Arc<Self> {
        Arc::new(Self {
            easyrtcsid: easyrtcsid.to_string(),
            app,
            fields: RwLock::new(FieldMap::new()),
            connections: RwLock::new(HashSet::new()),
        })
    }

    /// Session identifier.
    pub fn easyrtcsid(&self) -> &str {
        &self.easyrtcsid
    }

    /// Returns the owning application when it is still alive.
    pub fn app(&self) -> Option<Arc<Application>> {
        self.app.upgrade()
    }

    /// Binds a connection to this session.
    pub async fn bind(&self, easyrtcid: &str) {
        self.connections.write().await.insert(easyrtcid.to_string());
        debug!(
            "🎫 Connection '{}' bound to session '{}'",
            easyrtcid, self.easyrtcsid
        );
    }

    /// Unbinds a connection from this session.
    pub async fn unbind(&self, easyrtcid: &str) {
        self.connections.write().await.remove(easyrtcid);
    }

    /// Lists the easyrtcids of bound connections.
    pub async fn bound_ids(&self) -> Vec<String> {
        self.connections.read().await.iter().cloned().collect()
    }

    /// Sets a session field and pushes the updated session data to every
    /// bound connection.
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
        self.emit_session_data_field_update().await
    }

    /// Returns a session field.
    pub async fn get_field(&self, name: &str) -> Option<Field> {
        self.fields.read().await.get(name).cloned()
    }

    /// Returns true when the session carries shared fields.
    pub async fn has_shared_fields(&self) -> bool {
        self.fields.read().await.shared_wire().is_some()
    }

    /// Builds the `sessionData` payload for this session.
    pub async fn session_data_wire(&self) -> Value {
        let mut data = json!({ "easyrtcsid": self.easyrtcsid });
        if let Some(field) = self.fields.read().await.shared_wire() {
            data["field"] = field;
        }
        data
    }

    /// Pushes the current session data to every bound connection.
    ///
    /// Delivery failures for individual connections are logged and
    /// skipped.
    pub async fn emit_session_data_field_update(&self) -> SignalResult<()> {
        let state = self
            .app()
            .and_then(|app| app.server())
            .ok_or_else(|| SignalError::Server("Server state no longer available".to_string()))?;
        let payload = json!({ "sessionData": self.session_data_wire().await });
        for easyrtcid in self.bound_ids().await {
            let msg = OutboundMessage::new("sessionData").with_data(payload.clone());
            if let Err(e) = outbound::send(&state, &easyrtcid, msg).await {
                debug!(
                    "Session data push to '{}' not delivered: {}",
                    easyrtcid, e
                );
            }
        }
        Ok(())
    }
}
