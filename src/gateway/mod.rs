//! Realtime gateway
//!
//! Authenticated long-lived WebSocket connections, room-scoped
//! subscriptions, and fire-and-forget event fan-out. Rooms are named
//! `group:<id>` and `user:<id>`; those strings are part of the client
//! protocol and must not change.

pub mod connection;
pub mod events;
pub mod hub;
pub mod registry;

pub use connection::handle_gateway_upgrade;
pub use events::{group_room, user_room, ClientMessage, ServerMessage};
pub use hub::EventGateway;
pub use registry::{ConnId, RoomRegistry};
