//! BranchStore trait — persistence for branches and merged knowledge.
//!
//! Records are stored as structured fields, never as prose. All operations
//! are scoped by [`UserId`]; implementations must allow concurrent reads and
//! serialize writes so that the cross-conversation index is never corrupted
//! by interleaved read-modify-write cycles.
//!
//! Implementations: in-memory, JSONL file, SQLite.

use crate::branch::SubChatBranch;
use crate::error::StoreError;
use crate::knowledge::MergedKnowledge;
use crate::message::{BranchId, ConversationId, KnowledgeId, UserId};
use crate::retention::RetentionPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of writing a knowledge record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteReport {
    /// Whether the cross-conversation copy was written (false if the id was
    /// already indexed)
    pub indexed: bool,

    /// Ids dropped from the cross-conversation index by the count cap
    #[serde(default)]
    pub evicted: Vec<KnowledgeId>,

    /// Expired records removed by the opportunistic sweep
    #[serde(default)]
    pub expired: usize,
}

/// Outcome of a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub cross_conversation_removed: usize,
    pub conversation_removed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.cross_conversation_removed + self.conversation_removed
    }
}

#[async_trait]
pub trait BranchStore: Send + Sync {
    /// The backend name (e.g., "memory", "file", "sqlite").
    fn name(&self) -> &str;

    async fn get_branch(
        &self,
        user: &UserId,
        id: &BranchId,
    ) -> Result<Option<SubChatBranch>, StoreError>;

    /// Insert or replace a branch.
    async fn put_branch(&self, user: &UserId, branch: SubChatBranch) -> Result<(), StoreError>;

    /// All branches of a conversation, oldest first.
    async fn list_branches(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<SubChatBranch>, StoreError>;

    /// Look up a record in either scope.
    async fn get_knowledge(
        &self,
        user: &UserId,
        id: &KnowledgeId,
    ) -> Result<Option<MergedKnowledge>, StoreError>;

    /// Write a freshly merged record to both scopes as one atomic step:
    /// conversation-scope insert, cross-conversation append (skipped if the
    /// id is already indexed), expiry sweep of the index, then count cap.
    async fn put_knowledge(
        &self,
        user: &UserId,
        knowledge: MergedKnowledge,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<WriteReport, StoreError>;

    /// Conversation-scoped records, unfiltered and in no particular order.
    async fn list_by_conversation(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<MergedKnowledge>, StoreError>;

    /// The user's cross-conversation index, unfiltered.
    async fn list_cross_conversation(
        &self,
        user: &UserId,
    ) -> Result<Vec<MergedKnowledge>, StoreError>;

    /// Remove expired records for every user.
    async fn delete_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError>;
}
