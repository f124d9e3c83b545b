//! MongoDB-backed record store

use async_trait::async_trait;
use bson::{doc, DateTime, Document};

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{GroupDoc, UserDoc, GROUP_COLLECTION, USER_COLLECTION};
use crate::db::store::RecordStore;
use crate::progression::ProgressUpdate;
use crate::types::{AtriumError, Result};

/// Record store over the `users` and `groups` collections
#[derive(Clone)]
pub struct MongoRecordStore {
    users: MongoCollection<UserDoc>,
    groups: MongoCollection<GroupDoc>,
}

impl MongoRecordStore {
    /// Open both collections and apply their indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            users: client.collection::<UserDoc>(USER_COLLECTION).await?,
            groups: client.collection::<GroupDoc>(GROUP_COLLECTION).await?,
        })
    }
}

fn progress_update_doc(update: &ProgressUpdate) -> Result<Document> {
    let mut set = doc! { "metadata.updated_at": DateTime::now() };

    if let Some(modules) = &update.unlocked_modules {
        let mut ordered: Vec<u32> = modules.clone();
        ordered.sort_unstable();
        ordered.dedup();
        set.insert(
            "progress.unlockedModules",
            bson::to_bson(&ordered)
                .map_err(|e| AtriumError::Database(format!("Encode failed: {}", e)))?,
        );
    }

    if let Some(scores) = &update.module_scores {
        for (module, entry) in scores {
            set.insert(
                format!("progress.moduleScores.{}", module),
                bson::to_bson(entry)
                    .map_err(|e| AtriumError::Database(format!("Encode failed: {}", e)))?,
            );
        }
    }

    if let Some(passed) = update.final_quiz_passed {
        set.insert("progress.finalQuizPassed", passed);
    }

    Ok(doc! { "$set": set })
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "user_id": user_id }).await
    }

    async fn find_user_by_subject(&self, subject_id: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "subject_id": subject_id }).await
    }

    async fn set_user_group(&self, user_id: &str, group_id: &str) -> Result<bool> {
        // Compare-and-swap: only claim the field while it is still unset
        let result = self
            .users
            .update_one(
                doc! { "user_id": user_id, "group_id": { "$exists": false } },
                doc! { "$set": {
                    "group_id": group_id,
                    "metadata.updated_at": DateTime::now(),
                }},
            )
            .await?;

        Ok(result.matched_count == 1)
    }

    async fn clear_user_group(&self, user_id: &str) -> Result<()> {
        self.users
            .unset_field(doc! { "user_id": user_id }, "group_id")
            .await?;
        Ok(())
    }

    async fn push_login(&self, user_id: &str, at: DateTime) -> Result<()> {
        self.users
            .update_one(
                doc! { "user_id": user_id },
                doc! {
                    "$push": { "login_history": at },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;
        Ok(())
    }

    async fn apply_progress_update(&self, user_id: &str, update: &ProgressUpdate) -> Result<()> {
        let update_doc = progress_update_doc(update)?;
        self.users
            .update_one(doc! { "user_id": user_id }, update_doc)
            .await?;
        Ok(())
    }

    async fn create_group(&self, mut group: GroupDoc) -> Result<GroupDoc> {
        let id = self.groups.insert_one(group.clone()).await?;
        group._id = Some(id);
        Ok(group)
    }

    async fn find_group(&self, group_id: &str) -> Result<Option<GroupDoc>> {
        self.groups.find_one(doc! { "group_id": group_id }).await
    }

    async fn groups_with_member(&self, user_id: &str) -> Result<Vec<GroupDoc>> {
        self.groups.find_many(doc! { "members": user_id }).await
    }

    async fn count_groups_with_member(&self, user_id: &str) -> Result<u64> {
        self.groups.count(doc! { "members": user_id }).await
    }

    async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.groups
            .update_one(
                doc! { "group_id": group_id },
                doc! {
                    "$addToSet": { "members": user_id },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;
        Ok(())
    }

    async fn remove_group_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.groups
            .update_one(
                doc! { "group_id": group_id },
                doc! {
                    "$pull": { "members": user_id },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;
        Ok(())
    }
}
