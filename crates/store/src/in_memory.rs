//! In-memory backend — useful for testing and ephemeral sessions.

use crate::state::StoreState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sidechat_core::branch::SubChatBranch;
use sidechat_core::error::StoreError;
use sidechat_core::knowledge::MergedKnowledge;
use sidechat_core::message::{BranchId, ConversationId, KnowledgeId, UserId};
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::store::{BranchStore, SweepReport, WriteReport};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A store that keeps every record in process memory.
/// Reads share a lock; each write holds it exclusively for its whole
/// read-modify-write cycle.
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BranchStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_branch(
        &self,
        user: &UserId,
        id: &BranchId,
    ) -> Result<Option<SubChatBranch>, StoreError> {
        Ok(self.state.read().await.get_branch(user, id))
    }

    async fn put_branch(&self, user: &UserId, branch: SubChatBranch) -> Result<(), StoreError> {
        self.state.write().await.put_branch(user, branch);
        Ok(())
    }

    async fn list_branches(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<SubChatBranch>, StoreError> {
        Ok(self.state.read().await.list_branches(user, conversation))
    }

    async fn get_knowledge(
        &self,
        user: &UserId,
        id: &KnowledgeId,
    ) -> Result<Option<MergedKnowledge>, StoreError> {
        Ok(self.state.read().await.get_knowledge(user, id))
    }

    async fn put_knowledge(
        &self,
        user: &UserId,
        knowledge: MergedKnowledge,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<WriteReport, StoreError> {
        Ok(self
            .state
            .write()
            .await
            .put_knowledge(user, knowledge, policy, now))
    }

    async fn list_by_conversation(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        Ok(self.state.read().await.list_by_conversation(user, conversation))
    }

    async fn list_cross_conversation(
        &self,
        user: &UserId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        Ok(self.state.read().await.list_cross_conversation(user))
    }

    async fn delete_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError> {
        Ok(self.state.write().await.delete_expired(policy, now))
    }
}
