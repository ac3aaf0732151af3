//! Statistics tracking for the event bus.

use serde::{Deserialize, Serialize};

/// Event bus statistics for monitoring.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EventBusStats {
    /// Number of event names with an active listener.
    pub total_listeners: usize,
    /// Number of event names with a restorable default listener.
    pub default_listeners: usize,
    /// Total number of events emitted since bus creation.
    pub events_emitted: u64,
}
