//! Group membership service
//!
//! Enforces the one-student-one-group rule: a student belongs to at most one
//! group, tracked both on the user record (`group_id`) and in the group's
//! member set. Admins are exempt and may sit in any number of groups,
//! tracked purely via member sets. The admin/student split is decided once
//! at the top of `assign` and `remove` rather than scattered through them.

use bson::DateTime;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::db::schemas::{GroupDoc, GroupType, PathLevel, UserDoc};
use crate::db::RecordStore;
use crate::types::{AtriumError, Result};

pub struct MembershipService {
    store: Arc<dyn RecordStore>,
}

impl MembershipService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// All groups whose member set contains the user. No side effects.
    pub async fn groups_for_user(&self, user_id: &str) -> Result<Vec<GroupDoc>> {
        self.store.groups_with_member(user_id).await
    }

    /// Membership test; a missing group is `false`, not an error
    pub async fn is_member(&self, user_id: &str, group_id: &str) -> Result<bool> {
        Ok(self
            .store
            .find_group(group_id)
            .await?
            .map(|g| g.has_member(user_id))
            .unwrap_or(false))
    }

    /// Create an empty group on behalf of an admin
    pub async fn create_group(
        &self,
        name: String,
        group_type: GroupType,
        level: Option<PathLevel>,
        created_by: String,
    ) -> Result<GroupDoc> {
        let group = self
            .store
            .create_group(GroupDoc::new(name, group_type, level, created_by))
            .await?;
        info!(group = %group.group_id, kind = ?group.group_type, "Group created");
        Ok(group)
    }

    /// Assign a user to a group.
    ///
    /// Admin path (caller is admin, or the target user is one): idempotently
    /// add to the member set; the user's `group_id` is never touched.
    ///
    /// Student path: succeed idempotently when already in the target group;
    /// reject with `AlreadyAssigned` when in a different one (removal must
    /// precede reassignment); otherwise re-verify against the member sets
    /// before claiming `group_id` and joining the group.
    pub async fn assign(&self, user_id: &str, group_id: &str, is_admin: bool) -> Result<()> {
        let group = self
            .store
            .find_group(group_id)
            .await?
            .ok_or_else(|| AtriumError::NotFound(format!("group {group_id}")))?;
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AtriumError::NotFound(format!("user {user_id}")))?;

        if group.at_capacity_for(user_id) {
            return Err(AtriumError::GroupFull(group_id.to_string()));
        }

        if is_admin || user.is_admin() {
            self.store.add_group_member(group_id, user_id).await?;
            debug!(user = user_id, group = group_id, "Admin added to group");
            return Ok(());
        }

        self.assign_student(&user, group_id).await
    }

    async fn assign_student(&self, user: &UserDoc, group_id: &str) -> Result<()> {
        match user.group_id.as_deref() {
            Some(current) if current == group_id => {
                debug!(user = %user.user_id, group = group_id, "Already assigned, no-op");
                return Ok(());
            }
            Some(_) => return Err(AtriumError::AlreadyAssigned(user.user_id.clone())),
            None => {}
        }

        // Guard against stale reads and legacy data: a student with no
        // group_id must not appear in any member set either. Found state is
        // surfaced, not silently repaired.
        let memberships = self.store.count_groups_with_member(&user.user_id).await?;
        if memberships > 0 {
            return Err(AtriumError::AlreadyAssigned(user.user_id.clone()));
        }

        // Claim the user's group reference first; a lost race shows up here
        // as a failed compare-and-swap.
        if !self.store.set_user_group(&user.user_id, group_id).await? {
            return Err(AtriumError::AlreadyAssigned(user.user_id.clone()));
        }

        if let Err(e) = self.store.add_group_member(group_id, &user.user_id).await {
            error!(
                user = %user.user_id,
                group = group_id,
                error = %e,
                "Partial assignment: user claimed but group write failed"
            );
            return Err(AtriumError::Database(format!(
                "partial assignment of {} to {group_id}: {e}",
                user.user_id
            )));
        }

        info!(user = %user.user_id, group = group_id, "Student assigned to group");
        Ok(())
    }

    /// Remove a user from a group.
    ///
    /// Clears the user's `group_id` unconditionally and drops them from the
    /// member set. Idempotent: removing an absent member, or from a missing
    /// group, is a no-op. Never deletes an emptied group.
    pub async fn remove(&self, user_id: &str, group_id: &str) -> Result<()> {
        self.store.clear_user_group(user_id).await?;
        self.store.remove_group_member(group_id, user_id).await?;
        info!(user = user_id, group = group_id, "Removed from group");
        Ok(())
    }

    /// Append a login timestamp to the user's history
    pub async fn record_login(&self, user_id: &str) -> Result<()> {
        self.store.push_login(user_id, DateTime::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Role;
    use crate::db::MemoryRecordStore;

    struct Fixture {
        store: Arc<MemoryRecordStore>,
        service: MembershipService,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryRecordStore::new());
        let service = MembershipService::new(store.clone() as Arc<dyn RecordStore>);
        Fixture { store, service }
    }

    async fn seed_user(f: &Fixture, user_id: &str, role: Role) {
        f.store
            .insert_user(UserDoc::new(
                user_id.to_string(),
                format!("sub-{user_id}"),
                format!("{user_id}@example.test"),
                role,
            ))
            .await;
    }

    async fn seed_group(f: &Fixture, group_type: GroupType) -> String {
        f.service
            .create_group("g".to_string(), group_type, None, "admin-0".to_string())
            .await
            .expect("create group")
            .group_id
    }

    #[tokio::test]
    async fn test_student_assignment_updates_both_sides() {
        let f = fixture().await;
        seed_user(&f, "s1", Role::Student).await;
        let g = seed_group(&f, GroupType::Single).await;

        f.service.assign("s1", &g, false).await.expect("assign");

        let user = f.store.find_user("s1").await.unwrap().unwrap();
        assert_eq!(user.group_id.as_deref(), Some(g.as_str()));
        let group = f.store.find_group(&g).await.unwrap().unwrap();
        assert_eq!(group.members, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_assign_is_idempotent() {
        let f = fixture().await;
        seed_user(&f, "s1", Role::Student).await;
        let g = seed_group(&f, GroupType::Single).await;

        f.service.assign("s1", &g, false).await.expect("first");
        f.service.assign("s1", &g, false).await.expect("second");

        let group = f.store.find_group(&g).await.unwrap().unwrap();
        assert_eq!(group.members.len(), 1);
    }

    #[tokio::test]
    async fn test_second_group_rejected() {
        let f = fixture().await;
        seed_user(&f, "s1", Role::Student).await;
        let g1 = seed_group(&f, GroupType::Single).await;
        let g2 = seed_group(&f, GroupType::Single).await;

        f.service.assign("s1", &g1, false).await.expect("assign");
        let err = f.service.assign("s1", &g2, false).await.unwrap_err();
        assert!(matches!(err, AtriumError::AlreadyAssigned(_)));

        // State unchanged
        let user = f.store.find_user("s1").await.unwrap().unwrap();
        assert_eq!(user.group_id.as_deref(), Some(g1.as_str()));
        assert!(f.store.find_group(&g2).await.unwrap().unwrap().members.is_empty());
    }

    #[tokio::test]
    async fn test_membership_scan_guards_inconsistent_state() {
        let f = fixture().await;
        seed_user(&f, "s1", Role::Student).await;
        let g1 = seed_group(&f, GroupType::Multi).await;
        let g2 = seed_group(&f, GroupType::Multi).await;

        // Legacy-style inconsistency: member set entry without a group_id
        f.store.add_group_member(&g1, "s1").await.unwrap();

        let err = f.service.assign("s1", &g2, false).await.unwrap_err();
        assert!(matches!(err, AtriumError::AlreadyAssigned(_)));
    }

    #[tokio::test]
    async fn test_admin_joins_many_groups_without_group_id() {
        let f = fixture().await;
        seed_user(&f, "a1", Role::Admin).await;
        let g1 = seed_group(&f, GroupType::Multi).await;
        let g2 = seed_group(&f, GroupType::Multi).await;

        f.service.assign("a1", &g1, false).await.expect("g1");
        f.service.assign("a1", &g2, true).await.expect("g2");

        let user = f.store.find_user("a1").await.unwrap().unwrap();
        assert_eq!(user.group_id, None);
        assert!(f.service.is_member("a1", &g1).await.unwrap());
        assert!(f.service.is_member("a1", &g2).await.unwrap());
    }

    #[tokio::test]
    async fn test_single_group_capacity() {
        let f = fixture().await;
        seed_user(&f, "s1", Role::Student).await;
        seed_user(&f, "s2", Role::Student).await;
        let g = seed_group(&f, GroupType::Single).await;

        f.service.assign("s1", &g, false).await.expect("first member");
        let err = f.service.assign("s2", &g, false).await.unwrap_err();
        assert!(matches!(err, AtriumError::GroupFull(_)));
    }

    #[tokio::test]
    async fn test_remove_clears_both_sides_and_is_idempotent() {
        let f = fixture().await;
        seed_user(&f, "s1", Role::Student).await;
        let g = seed_group(&f, GroupType::Single).await;
        f.service.assign("s1", &g, false).await.expect("assign");

        f.service.remove("s1", &g).await.expect("remove");
        f.service.remove("s1", &g).await.expect("remove again");

        let user = f.store.find_user("s1").await.unwrap().unwrap();
        assert_eq!(user.group_id, None);
        let group = f.store.find_group(&g).await.unwrap().unwrap();
        assert!(group.members.is_empty());

        // Emptied group still exists and can be refilled
        f.service.assign("s1", &g, false).await.expect("reassign");
    }

    #[tokio::test]
    async fn test_cas_refuses_raced_claim() {
        let f = fixture().await;
        seed_user(&f, "s1", Role::Student).await;
        let g1 = seed_group(&f, GroupType::Single).await;

        // Another writer claimed the field between the service's read and write
        assert!(f.store.set_user_group("s1", &g1).await.unwrap());
        assert!(!f.store.set_user_group("s1", "other").await.unwrap());
    }

    #[tokio::test]
    async fn test_assign_unknown_group_or_user() {
        let f = fixture().await;
        seed_user(&f, "s1", Role::Student).await;
        let g = seed_group(&f, GroupType::Multi).await;

        assert!(matches!(
            f.service.assign("s1", "missing", false).await.unwrap_err(),
            AtriumError::NotFound(_)
        ));
        assert!(matches!(
            f.service.assign("ghost", &g, false).await.unwrap_err(),
            AtriumError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_is_member_on_missing_group() {
        let f = fixture().await;
        assert!(!f.service.is_member("s1", "missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_login_appends() {
        let f = fixture().await;
        seed_user(&f, "s1", Role::Student).await;

        f.service.record_login("s1").await.expect("login");
        f.service.record_login("s1").await.expect("login");

        let user = f.store.find_user("s1").await.unwrap().unwrap();
        assert_eq!(user.login_history.len(), 2);
    }
}
