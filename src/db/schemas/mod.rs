//! Database schemas for Atrium
//!
//! Defines the two record collections the core mutates: users and groups.

mod group;
mod metadata;
mod user;

pub use group::{GroupDoc, GroupType, GROUP_COLLECTION};
pub use metadata::Metadata;
pub use user::{PathLevel, Role, UserDoc, USER_COLLECTION};
