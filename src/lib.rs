//! Atrium - realtime core for the Atrium e-learning platform
//!
//! The subsystem of the platform that has to hold invariants under
//! concurrent access and keep connected clients in sync:
//!
//! - **Membership**: each student belongs to at most one group; admins are
//!   exempt and tracked purely via group member sets
//! - **Progression**: sequential module unlocking gated by a 60% passing
//!   threshold, validated as pure functions over a progress snapshot
//! - **Gateway**: authenticated WebSocket connections subscribed to
//!   `group:<id>` / `user:<id>` rooms, with best-effort event fan-out
//!
//! Content delivery, quiz authoring, and the rest of the platform's CRUD
//! surface live elsewhere; this crate only consumes a record store and an
//! identity verifier.

pub mod auth;
pub mod config;
pub mod db;
pub mod gateway;
pub mod membership;
pub mod progression;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AtriumError, Result};
