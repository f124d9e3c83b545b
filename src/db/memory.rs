//! In-memory record store
//!
//! Backs dev mode when MongoDB is unreachable, and the unit tests. Mirrors
//! the MongoDB implementation's semantics: `set_user_group` is a
//! compare-and-swap, member sets are idempotent, updates against missing
//! documents are silent no-ops.

use async_trait::async_trait;
use bson::DateTime;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::db::schemas::{GroupDoc, UserDoc};
use crate::db::store::RecordStore;
use crate::progression::ProgressUpdate;
use crate::types::Result;

#[derive(Default)]
pub struct MemoryRecordStore {
    users: Mutex<HashMap<String, UserDoc>>,
    groups: Mutex<HashMap<String, GroupDoc>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user; used by dev bootstrapping and tests
    pub async fn insert_user(&self, user: UserDoc) {
        self.users.lock().await.insert(user.user_id.clone(), user);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserDoc>> {
        Ok(self.users.lock().await.get(user_id).cloned())
    }

    async fn find_user_by_subject(&self, subject_id: &str) -> Result<Option<UserDoc>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|u| u.subject_id == subject_id)
            .cloned())
    }

    async fn set_user_group(&self, user_id: &str, group_id: &str) -> Result<bool> {
        let mut users = self.users.lock().await;
        match users.get_mut(user_id) {
            Some(user) if user.group_id.is_none() => {
                user.group_id = Some(group_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_user_group(&self, user_id: &str) -> Result<()> {
        if let Some(user) = self.users.lock().await.get_mut(user_id) {
            user.group_id = None;
        }
        Ok(())
    }

    async fn push_login(&self, user_id: &str, at: DateTime) -> Result<()> {
        if let Some(user) = self.users.lock().await.get_mut(user_id) {
            user.login_history.push(at);
        }
        Ok(())
    }

    async fn apply_progress_update(&self, user_id: &str, update: &ProgressUpdate) -> Result<()> {
        if let Some(user) = self.users.lock().await.get_mut(user_id) {
            user.progress.apply(update);
        }
        Ok(())
    }

    async fn create_group(&self, group: GroupDoc) -> Result<GroupDoc> {
        self.groups
            .lock()
            .await
            .insert(group.group_id.clone(), group.clone());
        Ok(group)
    }

    async fn find_group(&self, group_id: &str) -> Result<Option<GroupDoc>> {
        Ok(self.groups.lock().await.get(group_id).cloned())
    }

    async fn groups_with_member(&self, user_id: &str) -> Result<Vec<GroupDoc>> {
        let mut found: Vec<GroupDoc> = self
            .groups
            .lock()
            .await
            .values()
            .filter(|g| g.has_member(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        Ok(found)
    }

    async fn count_groups_with_member(&self, user_id: &str) -> Result<u64> {
        Ok(self
            .groups
            .lock()
            .await
            .values()
            .filter(|g| g.has_member(user_id))
            .count() as u64)
    }

    async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        if let Some(group) = self.groups.lock().await.get_mut(group_id) {
            if !group.has_member(user_id) {
                group.members.push(user_id.to_string());
            }
        }
        Ok(())
    }

    async fn remove_group_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        if let Some(group) = self.groups.lock().await.get_mut(group_id) {
            group.members.retain(|m| m != user_id);
        }
        Ok(())
    }
}
