//! # Switchboard Event System
//!
//! Event infrastructure shared between the signaling core and embedding
//! applications. The central piece is [`EventBus`], a single-listener-per-topic
//! dispatcher: each named event has exactly one active listener, and the
//! built-in (default) listener for a topic can be restored after an embedding
//! application has overridden it. This is deliberately *not* fan-out pub/sub —
//! one listener per name is what makes protocol behavior deterministic and
//! overridable.
//!
//! The crate also carries the pieces both sides of the event boundary need:
//!
//! * [`ClientSender`] — the outbound-delivery trait the state registry uses to
//!   push messages to connected clients without knowing about WebSockets.
//! * [`ShutdownState`] — shared flags for coordinating graceful shutdown.
//! * [`current_timestamp_millis`] — the single timestamp source used for the
//!   wire protocol's `serverTime` field and all roster timestamps.

pub mod bus;
pub mod error;
pub mod sender;
pub mod shutdown;
pub mod stats;
pub mod utils;

pub use bus::{EventBus, Listener, ListenerFuture};
pub use error::EventError;
pub use sender::ClientSender;
pub use shutdown::ShutdownState;
pub use stats::EventBusStats;
pub use utils::current_timestamp_millis;
