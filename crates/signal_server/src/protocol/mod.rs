//! Wire protocol: envelope types, validation, routing, and delivery.

pub mod codes;
pub mod outbound;
pub mod router;
pub mod types;
pub mod validation;

pub use router::{EventPayload, Router};
pub use types::{ClientEnvelope, OutboundEnvelope};
