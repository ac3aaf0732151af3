//! Root of the state registry.
//!
//! The [`ServerState`] owns the application map, the server-level option
//! map, and the injected [`ClientSender`] through which every outbound
//! message leaves the state layer. All child entities hold weak
//! back-references so teardown never cycles.

use crate::error::{SignalError, SignalResult};
use crate::state::application::Application;
use crate::state::options;
use serde_json::Value;
use signal_events::ClientSender;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Server-wide state registry.
#[derive(Debug)]
pub struct ServerState {
    /// Server-level options, seeded with the full catalog defaults.
    options: RwLock<HashMap<String, Value>>,
    /// Applications by name.
    applications: RwLock<HashMap<String, Arc<Application>>>,
    /// Outbound delivery handle, injected by the transport layer.
    client_sender: RwLock<Option<Arc<dyn ClientSender>>>,
    /// Epoch milliseconds at which the registry was created.
    started_on: u64,
}

impl ServerState {
    /// Creates a new state registry with catalog default options and no
    /// applications.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            options: RwLock::new(options::default_options()),
            applications: RwLock::new(HashMap::new()),
            client_sender: RwLock::new(None),
            started_on: signal_events::current_timestamp_millis(),
        })
    }

    /// Epoch milliseconds at which the registry was created.
    pub fn started_on(&self) -> u64 {
        self.started_on
    }

    /// Injects the outbound delivery handle used for all pushes to clients.
    pub async fn set_client_sender(&self, sender: Arc<dyn ClientSender>) {
        *self.client_sender.write().await = Some(sender);
    }

    /// Returns the outbound delivery handle, when one has been injected.
    pub async fn client_sender(&self) -> Option<Arc<dyn ClientSender>> {
        self.client_sender.read().await.clone()
    }

    /// Sets a server-level option.
    ///
    /// Only names from the closed catalog are accepted.
    pub async fn set_option(&self, name: &str, value: Value) -> SignalResult<()> {
        if !options::is_known_option(name) {
            return Err(SignalError::ServerWarning(format!(
                "Unknown option name '{name}'"
            )));
        }
        debug!("Setting server option '{}' = {}", name, value);
        self.options.write().await.insert(name.to_string(), value);
        Ok(())
    }

    /// Returns a server-level option value.
    pub async fn get_option(&self, name: &str) -> Option<Value> {
        self.options.read().await.get(name).cloned()
    }

    /// Returns a server-level option interpreted as a boolean, defaulting
    /// to false for absent or non-boolean values.
    pub async fn option_bool(&self, name: &str) -> bool {
        self.get_option(name)
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Returns a server-level option interpreted as a string.
    pub async fn option_str(&self, name: &str) -> Option<String> {
        self.get_option(name)
            .await
            .and_then(|v| v.as_str().map(String::from))
    }

    /// Tests a candidate against the pattern stored in a `*RegExp` option.
    pub async fn pattern_matches(&self, pattern_option: &str, candidate: &str) -> bool {
        match self.option_str(pattern_option).await {
            Some(pattern) => options::pattern_matches(&pattern, candidate),
            None => false,
        }
    }

    /// Creates a new application.
    ///
    /// The name must match `appNameRegExp` and must not already exist.
    /// Default application fields from `appDefaultFieldObj` are applied to
    /// the new application.
    pub async fn create_application(
        self: &Arc<Self>,
        app_name: &str,
    ) -> SignalResult<Arc<Application>> {
        if !self
            .pattern_matches(options::APP_NAME_REG_EXP, app_name)
            .await
        {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid application name '{app_name}'"
            )));
        }

        let default_fields = self
            .get_option(options::APP_DEFAULT_FIELD_OBJ)
            .await
            .unwrap_or(Value::Null);

        let mut applications = self.applications.write().await;
        if applications.contains_key(app_name) {
            return Err(SignalError::ApplicationWarning(format!(
                "Application '{app_name}' already exists"
            )));
        }
        let app = Application::new(app_name, Arc::downgrade(self), &default_fields);
        applications.insert(app_name.to_string(), app.clone());
        info!("📦 Application created: '{}'", app_name);
        Ok(app)
    }

    /// Returns an application by name.
    pub async fn get_application(&self, app_name: &str) -> Option<Arc<Application>> {
        self.applications.read().await.get(app_name).cloned()
    }

    /// Returns the application with the given name, creating it when absent.
    ///
    /// Concurrent callers for the same name all resolve to the single
    /// surviving instance.
    pub async fn get_or_create_application(
        self: &Arc<Self>,
        app_name: &str,
    ) -> SignalResult<Arc<Application>> {
        if !self
            .pattern_matches(options::APP_NAME_REG_EXP, app_name)
            .await
        {
            return Err(SignalError::ApplicationWarning(format!(
                "Invalid application name '{app_name}'"
            )));
        }

        let default_fields = self
            .get_option(options::APP_DEFAULT_FIELD_OBJ)
            .await
            .unwrap_or(Value::Null);

        let mut applications = self.applications.write().await;
        if let Some(app) = applications.get(app_name) {
            return Ok(app.clone());
        }
        let app = Application::new(app_name, Arc::downgrade(self), &default_fields);
        applications.insert(app_name.to_string(), app.clone());
        info!("📦 Application created: '{}'", app_name);
        Ok(app)
    }

    /// Lists the names of all applications.
    pub async fn application_names(&self) -> Vec<String> {
        self.applications.read().await.keys().cloned().collect()
    }

    /// Finds the application and connection record for an easyrtcid.
    ///
    /// Identifiers are unique per process, so the first match wins.
    pub async fn find_connection(
        &self,
        easyrtcid: &str,
    ) -> Option<(Arc<Application>, Arc<crate::state::connection::ClientConnection>)> {
        let applications = self.applications.read().await;
        for app in applications.values() {
            if let Some(conn) = app.get_connection(easyrtcid).await {
                return Some((app.clone(), conn));
            }
        }
        None
    }
}
