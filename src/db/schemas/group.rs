//! Group document schema
//!
//! Groups are created empty by an admin and mutated only through the
//! membership service. `single` groups hold at most one member; `multi`
//! groups are unbounded.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{Metadata, PathLevel};

/// Collection name for groups
pub const GROUP_COLLECTION: &str = "groups";

/// Membership capacity class
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    /// At most one member once non-empty; individual-student tracking
    Single,
    /// One or more members; collaborative activities
    #[default]
    Multi,
}

/// Group document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct GroupDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Group identifier (opaque, unique)
    pub group_id: String,

    pub name: String,

    #[serde(default)]
    pub group_type: GroupType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<PathLevel>,

    /// Id of the admin who created the group
    pub created_by: String,

    /// Member user ids; set semantics, insertion order irrelevant
    #[serde(default)]
    pub members: Vec<String>,
}

impl GroupDoc {
    /// Create a new, empty group
    pub fn new(
        name: String,
        group_type: GroupType,
        level: Option<PathLevel>,
        created_by: String,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            group_id: Uuid::new_v4().to_string(),
            name,
            group_type,
            level,
            created_by,
            members: Vec::new(),
        }
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    /// Would adding `user_id` violate the single-group capacity bound?
    pub fn at_capacity_for(&self, user_id: &str) -> bool {
        self.group_type == GroupType::Single
            && !self.members.is_empty()
            && !self.has_member(user_id)
    }
}

impl IntoIndexes for GroupDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "group_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("group_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "members": 1 },
                Some(
                    IndexOptions::builder()
                        .name("members_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for GroupDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_group_capacity() {
        let mut group = GroupDoc::new(
            "solo".to_string(),
            GroupType::Single,
            None,
            "admin-1".to_string(),
        );

        assert!(!group.at_capacity_for("s1"));
        group.members.push("s1".to_string());
        assert!(!group.at_capacity_for("s1"));
        assert!(group.at_capacity_for("s2"));
    }

    #[test]
    fn test_multi_group_never_at_capacity() {
        let mut group = GroupDoc::new(
            "cohort".to_string(),
            GroupType::Multi,
            Some(PathLevel::Beginner),
            "admin-1".to_string(),
        );
        group.members.push("s1".to_string());
        assert!(!group.at_capacity_for("s2"));
    }
}
