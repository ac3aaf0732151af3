//! Single-listener-per-topic event bus with restorable defaults.

use crate::error::EventError;
use crate::stats::EventBusStats;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Boxed future returned by event listeners.
pub type ListenerFuture = BoxFuture<'static, Result<(), EventError>>;

/// An event listener: an async function over the bus payload type.
pub type Listener<P> = Arc<dyn Fn(P) -> ListenerFuture + Send + Sync>;

/// The event dispatcher used by the signaling core.
///
/// `EventBus` maps each event name to exactly one active listener. Installing
/// a listener with [`EventBus::on`] replaces whatever was there before, so an
/// embedding application can override any piece of default protocol behavior
/// and later restore it with [`EventBus::set_default_listener`].
///
/// Uses `DashMap` for lock-free concurrent access to the listener tables; the
/// listeners themselves run on the caller's task.
pub struct EventBus<P> {
    /// Active listener per event name.
    listeners: DashMap<String, Listener<P>>,

    /// Built-in listeners, recorded at registration time so they can be
    /// restored after an override.
    defaults: DashMap<String, Listener<P>>,

    /// Total number of events emitted since creation.
    events_emitted: AtomicU64,
}

impl<P> std::fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("defaults", &self.defaults.len())
            .field(
                "events_emitted",
                &self.events_emitted.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl<P: Send + 'static> EventBus<P> {
    /// Creates an empty bus with no listeners registered.
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            defaults: DashMap::new(),
            events_emitted: AtomicU64::new(0),
        }
    }

    /// Registers the built-in listener for an event name.
    ///
    /// The listener is recorded as the restorable default and also installed
    /// as the active listener unless an override is already in place.
    pub fn register_default(&self, event_name: &str, listener: Listener<P>) {
        self.defaults
            .insert(event_name.to_string(), listener.clone());
        self.listeners
            .entry(event_name.to_string())
            .or_insert(listener);
    }

    /// Installs a listener for an event name, replacing any prior one.
    pub fn on(&self, event_name: &str, listener: Listener<P>) {
        debug!("🎧 Listener installed for event '{}'", event_name);
        self.listeners.insert(event_name.to_string(), listener);
    }

    /// Invokes the active listener for an event name with the given payload.
    ///
    /// Exactly one listener runs; its result is returned to the caller.
    /// Emitting an event nobody listens to is an error — the protocol relies
    /// on every routed topic having a default listener installed.
    pub async fn emit(&self, event_name: &str, payload: P) -> Result<(), EventError> {
        let listener = self
            .listeners
            .get(event_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EventError::NoListener(event_name.to_string()))?;

        self.events_emitted.fetch_add(1, Ordering::Relaxed);
        listener(payload).await
    }

    /// Restores the built-in listener for one event name, discarding any
    /// override.
    pub fn set_default_listener(&self, event_name: &str) -> Result<(), EventError> {
        match self.defaults.get(event_name) {
            Some(entry) => {
                self.listeners
                    .insert(event_name.to_string(), entry.value().clone());
                debug!("🔄 Default listener restored for event '{}'", event_name);
                Ok(())
            }
            None => {
                warn!("No default listener known for event '{}'", event_name);
                Err(EventError::NoDefaultListener(event_name.to_string()))
            }
        }
    }

    /// Restores the built-in listeners for every event name that has one.
    pub fn set_default_listeners(&self) {
        for entry in self.defaults.iter() {
            self.listeners
                .insert(entry.key().clone(), entry.value().clone());
        }
        debug!("🔄 All default listeners restored");
    }

    /// Returns whether any listener is installed for the event name.
    pub fn has_listener(&self, event_name: &str) -> bool {
        self.listeners.contains_key(event_name)
    }

    /// Gets the current bus statistics.
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_listeners: self.listeners.len(),
            default_listeners: self.defaults.len(),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
        }
    }
}

impl<P: Send + 'static> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_listener(counter: Arc<AtomicUsize>) -> Listener<u32> {
        Arc::new(move |_payload| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn emit_invokes_single_listener() {
        let bus: EventBus<u32> = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.register_default("ping", counting_listener(counter.clone()));

        bus.emit("ping", 1).await.expect("emit should succeed");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn emit_without_listener_fails() {
        let bus: EventBus<u32> = EventBus::new();
        let err = bus.emit("missing", 0).await.unwrap_err();
        assert!(matches!(err, EventError::NoListener(_)));
    }

    #[tokio::test]
    async fn on_replaces_listener_and_default_restores_it() {
        let bus: EventBus<u32> = EventBus::new();
        let default_count = Arc::new(AtomicUsize::new(0));
        let override_count = Arc::new(AtomicUsize::new(0));

        bus.register_default("topic", counting_listener(default_count.clone()));
        bus.on("topic", counting_listener(override_count.clone()));

        bus.emit("topic", 0).await.unwrap();
        assert_eq!(default_count.load(Ordering::SeqCst), 0);
        assert_eq!(override_count.load(Ordering::SeqCst), 1);

        bus.set_default_listener("topic").unwrap();
        bus.emit("topic", 0).await.unwrap();
        assert_eq!(default_count.load(Ordering::SeqCst), 1);
        assert_eq!(override_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn set_default_listeners_restores_everything() {
        let bus: EventBus<u32> = EventBus::new();
        let defaults = Arc::new(AtomicUsize::new(0));
        let overrides = Arc::new(AtomicUsize::new(0));

        for name in ["a", "b"] {
            bus.register_default(name, counting_listener(defaults.clone()));
            bus.on(name, counting_listener(overrides.clone()));
        }
        bus.set_default_listeners();

        bus.emit("a", 0).await.unwrap();
        bus.emit("b", 0).await.unwrap();
        assert_eq!(defaults.load(Ordering::SeqCst), 2);
        assert_eq!(overrides.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restoring_unknown_default_fails() {
        let bus: EventBus<u32> = EventBus::new();
        let err = bus.set_default_listener("nope").unwrap_err();
        assert!(matches!(err, EventError::NoDefaultListener(_)));
    }

    #[tokio::test]
    async fn stats_track_emissions() {
        let bus: EventBus<u32> = EventBus::new();
        bus.register_default("tick", Arc::new(|_| Box::pin(async { Ok(()) })));
        for _ in 0..3 {
            bus.emit("tick", 0).await.unwrap();
        }
        let stats = bus.stats();
        assert_eq!(stats.events_emitted, 3);
        assert_eq!(stats.total_listeners, 1);
    }
}
