//! State registry: server, applications, rooms, connections, sessions, and
//! groups.
//!
//! The registry is a tree rooted at [`server::ServerState`]. Child entities
//! hold [`std::sync::Weak`] back-references upward so a dropped parent is
//! observed rather than kept alive.

pub mod application;
pub mod connection;
pub mod field;
pub mod group;
pub mod options;
pub mod room;
pub mod server;
pub mod session;

pub use application::Application;
pub use connection::ClientConnection;
pub use field::{Field, FieldMap};
pub use group::Group;
pub use room::{ConnectionRoom, Room, RoomOccupant};
pub use server::ServerState;
pub use session::Session;
