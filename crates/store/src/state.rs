//! Plain in-process record state shared by the in-memory and file backends.
//!
//! Every mutating method here runs entirely inside the caller's write lock,
//! which is what makes `put_knowledge` an atomic append-and-cap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sidechat_core::branch::SubChatBranch;
use sidechat_core::knowledge::{KnowledgeScope, MergedKnowledge};
use sidechat_core::message::{BranchId, ConversationId, KnowledgeId, UserId};
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::store::{SweepReport, WriteReport};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    users: HashMap<UserId, UserRecords>,
}

#[derive(Debug, Clone, Default)]
struct UserRecords {
    branches: HashMap<BranchId, SubChatBranch>,
    conversation: HashMap<ConversationId, Vec<MergedKnowledge>>,
    cross: Vec<MergedKnowledge>,
}

/// One persisted line of the JSONL file backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum StoredRecord {
    Branch {
        user_id: UserId,
        branch: SubChatBranch,
    },
    Knowledge {
        user_id: UserId,
        scope: KnowledgeScope,
        knowledge: MergedKnowledge,
    },
}

impl StoreState {
    pub fn get_branch(&self, user: &UserId, id: &BranchId) -> Option<SubChatBranch> {
        self.users.get(user)?.branches.get(id).cloned()
    }

    pub fn put_branch(&mut self, user: &UserId, branch: SubChatBranch) {
        self.user_mut(user).branches.insert(branch.id.clone(), branch);
    }

    pub fn list_branches(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Vec<SubChatBranch> {
        let Some(records) = self.users.get(user) else {
            return Vec::new();
        };
        let mut branches: Vec<SubChatBranch> = records
            .branches
            .values()
            .filter(|b| &b.conversation_id == conversation)
            .cloned()
            .collect();
        branches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        branches
    }

    pub fn get_knowledge(&self, user: &UserId, id: &KnowledgeId) -> Option<MergedKnowledge> {
        let records = self.users.get(user)?;
        records
            .conversation
            .values()
            .flatten()
            .chain(records.cross.iter())
            .find(|k| &k.id == id)
            .cloned()
    }

    pub fn put_knowledge(
        &mut self,
        user: &UserId,
        knowledge: MergedKnowledge,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> WriteReport {
        let records = self.user_mut(user);
        let mut report = WriteReport::default();

        let local = records
            .conversation
            .entry(knowledge.conversation_id.clone())
            .or_default();
        if !local.iter().any(|k| k.id == knowledge.id) {
            local.push(knowledge.clone());
        }

        if !records.cross.iter().any(|k| k.id == knowledge.id) {
            records.cross.push(knowledge);
            report.indexed = true;
        }

        report.expired = records.sweep(policy, now).total();

        let overflow = policy.cross_conversation_overflow(&records.cross);
        if !overflow.is_empty() {
            records.cross.retain(|k| !overflow.contains(&k.id));
            report.evicted = overflow;
        }

        report
    }

    pub fn list_by_conversation(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Vec<MergedKnowledge> {
        self.users
            .get(user)
            .and_then(|r| r.conversation.get(conversation))
            .cloned()
            .unwrap_or_default()
    }

    pub fn list_cross_conversation(&self, user: &UserId) -> Vec<MergedKnowledge> {
        self.users
            .get(user)
            .map(|r| r.cross.clone())
            .unwrap_or_default()
    }

    pub fn delete_expired(&mut self, policy: &RetentionPolicy, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for records in self.users.values_mut() {
            let swept = records.sweep(policy, now);
            report.cross_conversation_removed += swept.cross_conversation_removed;
            report.conversation_removed += swept.conversation_removed;
        }
        report
    }

    /// Flatten into persistable records, in a stable order.
    pub fn records(&self) -> Vec<StoredRecord> {
        let mut users: Vec<&UserId> = self.users.keys().collect();
        users.sort();

        let mut out = Vec::new();
        for user in users {
            let records = &self.users[user];

            let mut branches: Vec<&SubChatBranch> = records.branches.values().collect();
            branches.sort_by(|a, b| a.id.cmp(&b.id));
            out.extend(branches.into_iter().map(|b| StoredRecord::Branch {
                user_id: user.clone(),
                branch: b.clone(),
            }));

            let mut conversations: Vec<&ConversationId> = records.conversation.keys().collect();
            conversations.sort();
            for conversation in conversations {
                out.extend(records.conversation[conversation].iter().map(|k| {
                    StoredRecord::Knowledge {
                        user_id: user.clone(),
                        scope: KnowledgeScope::Conversation,
                        knowledge: k.clone(),
                    }
                }));
            }

            out.extend(records.cross.iter().map(|k| StoredRecord::Knowledge {
                user_id: user.clone(),
                scope: KnowledgeScope::CrossConversation,
                knowledge: k.clone(),
            }));
        }
        out
    }

    /// Restore one persisted record.
    pub fn apply(&mut self, record: StoredRecord) {
        match record {
            StoredRecord::Branch { user_id, branch } => self.put_branch(&user_id, branch),
            StoredRecord::Knowledge {
                user_id,
                scope: KnowledgeScope::Conversation,
                knowledge,
            } => self
                .user_mut(&user_id)
                .conversation
                .entry(knowledge.conversation_id.clone())
                .or_default()
                .push(knowledge),
            StoredRecord::Knowledge {
                user_id,
                scope: KnowledgeScope::CrossConversation,
                knowledge,
            } => self.user_mut(&user_id).cross.push(knowledge),
        }
    }

    fn user_mut(&mut self, user: &UserId) -> &mut UserRecords {
        self.users.entry(user.clone()).or_default()
    }
}

impl UserRecords {
    fn sweep(&mut self, policy: &RetentionPolicy, now: DateTime<Utc>) -> SweepReport {
        let before = self.cross.len();
        self.cross.retain(|k| !policy.is_expired(k, now));
        let mut report = SweepReport {
            cross_conversation_removed: before - self.cross.len(),
            conversation_removed: 0,
        };

        if policy.purge_conversation_scope {
            for records in self.conversation.values_mut() {
                let before = records.len();
                records.retain(|k| !policy.is_expired(k, now));
                report.conversation_removed += before - records.len();
            }
            self.conversation.retain(|_, records| !records.is_empty());
        }

        report
    }
}
