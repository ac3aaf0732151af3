//! Connection groups used as message-targeting filters.
//!
//! A group is a named membership set within an application. Groups carry no
//! fields or options; they exist so an application message can be fanned
//! out to a subset of connections, optionally intersected with a room.

use crate::state::application::Application;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// A named membership set within an application.
#[derive(Debug)]
pub struct Group {
    name: String,
    app: Weak<Application>,
    members: RwLock<HashSet<String>>,
}

impl Group {
    pub(crate) fn new(name: &str, app: Weak<Application>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            app,
            members: RwLock::new(HashSet::new()),
        })
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning application when it is still alive.
    pub fn app(&self) -> Option<Arc<Application>> {
        self.app.upgrade()
    }

    /// Adds a connection to the group. Adding an existing member is a
    /// no-op.
    pub async fn add_member(&self, easyrtcid: &str) {
        self.members.write().await.insert(easyrtcid.to_string());
    }

    /// Removes a connection from the group, returning whether it was a
    /// member.
    pub async fn remove_member(&self, easyrtcid: &str) -> bool {
        self.members.write().await.remove(easyrtcid)
    }

    /// Returns true when the connection is a member.
    pub async fn contains(&self, easyrtcid: &str) -> bool {
        self.members.read().await.contains(easyrtcid)
    }

    /// Lists member easyrtcids.
    pub async fn member_ids(&self) -> Vec<String> {
        self.members.read().await.iter().cloned().collect()
    }

    /// Number of members.
    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }
}
