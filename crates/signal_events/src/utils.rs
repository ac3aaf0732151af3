//! Utility functions shared across the event system.

/// Returns the current Unix timestamp in milliseconds.
///
/// The wire protocol's `serverTime` field and all roster timestamps
/// (`roomJoinTime`, roster-fetch baselines) use this single source so that
/// delta ordering is consistent within the process.
pub fn current_timestamp_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
