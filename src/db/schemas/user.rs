//! User document schema
//!
//! Maps an external auth subject to a platform user, carries the group
//! reference for students and the embedded progression snapshot.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::progression::ProgressSnapshot;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Platform role
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Student,
    Teacher,
}

/// Learning-path level, shared by users and groups
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PathLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Platform user identifier (opaque, unique)
    pub user_id: String,

    /// External auth subject this user resolves from
    pub subject_id: String,

    pub email: String,

    #[serde(default)]
    pub role: Role,

    /// The one group a student belongs to; absent for admins and teachers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_path: Option<PathLevel>,

    /// Append-only login timestamps
    #[serde(default)]
    pub login_history: Vec<DateTime>,

    #[serde(default)]
    pub progress: ProgressSnapshot,
}

impl UserDoc {
    pub fn new(user_id: String, subject_id: String, email: String, role: Role) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id,
            subject_id,
            email,
            role,
            group_id: None,
            learning_path: None,
            login_history: Vec::new(),
            progress: ProgressSnapshot::default(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "subject_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("subject_id_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
