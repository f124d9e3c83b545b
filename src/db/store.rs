//! Record store seam
//!
//! The core never talks to MongoDB directly; it goes through this trait so
//! components are dependency-injected and dev mode / tests can run against
//! the in-memory implementation. No transaction API is assumed; the one
//! guarded write (`set_user_group`) is a single-document compare-and-swap.

use async_trait::async_trait;
use bson::DateTime;

use crate::db::schemas::{GroupDoc, UserDoc};
use crate::progression::ProgressUpdate;
use crate::types::Result;

/// Typed find/create/update/count/delete-field operations over the user and
/// group collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserDoc>>;

    /// Resolve an external auth subject to a platform user
    async fn find_user_by_subject(&self, subject_id: &str) -> Result<Option<UserDoc>>;

    /// Claim the user's group reference.
    ///
    /// Writes only when `group_id` is currently unset and reports whether the
    /// write landed; a `false` return means the field was already taken (or
    /// the user vanished) and the caller lost the race.
    async fn set_user_group(&self, user_id: &str, group_id: &str) -> Result<bool>;

    /// Delete the user's group reference; no-op when already unset
    async fn clear_user_group(&self, user_id: &str) -> Result<()>;

    /// Append a login timestamp to the user's history
    async fn push_login(&self, user_id: &str, at: DateTime) -> Result<()>;

    /// Merge a validated progress update into the user's snapshot
    async fn apply_progress_update(&self, user_id: &str, update: &ProgressUpdate) -> Result<()>;

    async fn create_group(&self, group: GroupDoc) -> Result<GroupDoc>;

    async fn find_group(&self, group_id: &str) -> Result<Option<GroupDoc>>;

    /// All groups whose member set contains the user
    async fn groups_with_member(&self, user_id: &str) -> Result<Vec<GroupDoc>>;

    async fn count_groups_with_member(&self, user_id: &str) -> Result<u64>;

    /// Add to the member set; idempotent
    async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<()>;

    /// Remove from the member set; removing an absent member is a no-op
    async fn remove_group_member(&self, group_id: &str, user_id: &str) -> Result<()>;
}
