//! SubChat engine — the branch lifecycle for one user session.
//!
//! ```text
//! open ──► active ──► merging ──► merged
//!             │          │
//!             │          └──► active   (knowledge write failed, retry later)
//!             └──► discarded
//! ```
//!
//! `open` is transient: [`SubChatEngine::open_branch`] persists the branch
//! already `active`. A merge always finishes with exactly one
//! [`MergedKnowledge`] record: if the configured summarizer fails or
//! exceeds its timeout, the extractive fallback writes the summary instead.

use crate::summarizer::ExtractiveSummarizer;
use chrono::Utc;
use sidechat_config::AppConfig;
use sidechat_core::branch::{BranchState, SubChatBranch};
use sidechat_core::error::{Error, Result};
use sidechat_core::event::{BranchEvent, SessionEvents};
use sidechat_core::knowledge::{KnowledgeSummary, MergedKnowledge};
use sidechat_core::message::{
    BranchId, ConversationId, ConversationSnapshot, KnowledgeId, Role, Turn, UserId,
};
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::store::BranchStore;
use sidechat_core::summarizer::{SummarizationRequest, Summarizer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a completed merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub knowledge: MergedKnowledge,
    /// The extractive fallback produced the summary
    pub used_fallback: bool,
    /// Cross-conversation records evicted to make room
    pub evicted: Vec<KnowledgeId>,
}

/// Read-only view of a merged branch, for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchView {
    pub knowledge: MergedKnowledge,
    /// The branch transcript, empty when the branch record is gone
    pub turns: Vec<Turn>,
}

impl BranchView {
    pub fn knowledge_id(&self) -> &KnowledgeId {
        &self.knowledge.id
    }

    pub fn has_transcript(&self) -> bool {
        !self.turns.is_empty()
    }
}

pub struct SubChatEngine {
    user_id: UserId,
    store: Arc<dyn BranchStore>,
    summarizer: Arc<dyn Summarizer>,
    fallback: ExtractiveSummarizer,
    policy: RetentionPolicy,
    merge_timeout: Duration,
    events: Arc<SessionEvents>,
}

impl SubChatEngine {
    pub fn new(
        user_id: UserId,
        store: Arc<dyn BranchStore>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            user_id,
            store,
            summarizer,
            fallback: ExtractiveSummarizer::default(),
            policy: RetentionPolicy::default(),
            merge_timeout: Duration::from_secs(8),
            events: Arc::new(SessionEvents::new()),
        }
    }

    /// Apply retention, merge timeout and fallback settings from config.
    pub fn with_config(self, config: &AppConfig) -> Self {
        self.with_policy(config.retention.clone())
            .with_merge_timeout(config.summarizer.timeout())
            .with_fallback(ExtractiveSummarizer::new(config.summarizer.excerpt_chars))
    }

    pub fn with_policy(mut self, policy: RetentionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_merge_timeout(mut self, timeout: Duration) -> Self {
        self.merge_timeout = timeout;
        self
    }

    pub fn with_fallback(mut self, fallback: ExtractiveSummarizer) -> Self {
        self.fallback = fallback;
        self
    }

    /// Share an event bus with other components of the same session.
    pub fn with_events(mut self, events: Arc<SessionEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn events(&self) -> &Arc<SessionEvents> {
        &self.events
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Open a side discussion on `parent_message_id`.
    ///
    /// `selected_text` may be empty, meaning the whole message.
    pub async fn open_branch(
        &self,
        snapshot: &ConversationSnapshot,
        parent_message_id: &str,
        selected_text: &str,
    ) -> Result<BranchId> {
        self.start_branch(snapshot, parent_message_id, selected_text, None)
            .await
    }

    pub async fn append_turn(&self, branch_id: &BranchId, role: Role, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("Turn content must not be empty".into()));
        }

        let mut branch = self.load(branch_id).await?;
        if branch.state != BranchState::Active {
            return Err(invalid_state(&branch, "append a turn to"));
        }

        branch.turns.push(Turn::new(role, content));
        branch.updated_at = Utc::now();
        let turn_count = branch.turns.len();
        self.store.put_branch(&self.user_id, branch).await?;

        debug!(branch_id = %branch_id, role = %role, turn_count, "Turn appended");
        self.events.publish(BranchEvent::TurnAppended {
            branch_id: branch_id.clone(),
            turn_count,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Summarize the branch and record it as merged knowledge.
    ///
    /// On a store failure the branch goes back to `active` and the error is
    /// returned so the caller can retry. A branch left in `merging` by an
    /// interrupted merge is finished on the next call.
    pub async fn request_merge(&self, branch_id: &BranchId) -> Result<MergeOutcome> {
        let mut branch = self.load(branch_id).await?;
        let knowledge_id = KnowledgeId::for_branch(branch_id);

        match branch.state {
            BranchState::Active => {
                if branch.question_count() == 0 {
                    return Err(Error::NothingToMerge(branch_id.to_string()));
                }
                self.set_state(&mut branch, BranchState::Merging).await?;
            }
            BranchState::Merging => {
                let existing = self.store.get_knowledge(&self.user_id, &knowledge_id).await?;
                if let Some(existing) = existing {
                    info!(branch_id = %branch_id, "Finishing interrupted merge");
                    self.set_state(&mut branch, BranchState::Merged).await?;
                    return Ok(MergeOutcome {
                        used_fallback: existing.fallback,
                        knowledge: existing,
                        evicted: Vec::new(),
                    });
                }
                info!(branch_id = %branch_id, "Resuming interrupted merge");
            }
            _ => return Err(invalid_state(&branch, "merge")),
        }

        let (summary, used_fallback) = self.summarize(&branch).await;
        let now = Utc::now();
        let knowledge = MergedKnowledge::from_branch(&branch, summary, now, used_fallback);

        let report = match self
            .store
            .put_knowledge(&self.user_id, knowledge.clone(), &self.policy, now)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    branch_id = %branch_id,
                    error = %e,
                    "Knowledge write failed, branch back to active"
                );
                if let Err(restore) = self.set_state(&mut branch, BranchState::Active).await {
                    warn!(
                        branch_id = %branch_id,
                        error = %restore,
                        "Failed to restore branch state"
                    );
                }
                return Err(e.into());
            }
        };

        self.set_state(&mut branch, BranchState::Merged).await?;

        info!(
            branch_id = %branch_id,
            knowledge_id = %knowledge.id,
            topic = %knowledge.topic,
            questions = knowledge.question_count,
            used_fallback,
            evicted = report.evicted.len(),
            "Branch merged"
        );
        self.events.publish(BranchEvent::KnowledgeMerged {
            knowledge_id: knowledge.id.clone(),
            conversation_id: knowledge.conversation_id.clone(),
            used_fallback,
            timestamp: now,
        });
        if !report.evicted.is_empty() {
            self.events.publish(BranchEvent::KnowledgeEvicted {
                knowledge_ids: report.evicted.clone(),
                timestamp: now,
            });
        }

        Ok(MergeOutcome {
            knowledge,
            used_fallback,
            evicted: report.evicted,
        })
    }

    /// Abandon an active branch. Its turns are dropped and nothing is merged.
    pub async fn discard(&self, branch_id: &BranchId) -> Result<()> {
        let mut branch = self.load(branch_id).await?;
        if branch.state != BranchState::Active {
            return Err(invalid_state(&branch, "discard"));
        }
        branch.turns.clear();
        self.set_state(&mut branch, BranchState::Discarded).await?;
        info!(branch_id = %branch_id, "Branch discarded");
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub async fn branch(&self, branch_id: &BranchId) -> Result<SubChatBranch> {
        self.load(branch_id).await
    }

    /// Every branch opened on a message, oldest first.
    pub async fn branches_for_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &str,
    ) -> Result<Vec<SubChatBranch>> {
        let mut branches: Vec<SubChatBranch> = self
            .store
            .list_branches(&self.user_id, conversation_id)
            .await?
            .into_iter()
            .filter(|b| b.parent_message_id == message_id)
            .collect();
        branches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(branches)
    }

    /// Rebuild a read-only view of merged knowledge. Not a state change.
    pub async fn reopen(&self, knowledge_id: &KnowledgeId) -> Result<BranchView> {
        let knowledge = self
            .store
            .get_knowledge(&self.user_id, knowledge_id)
            .await?
            .ok_or_else(|| Error::KnowledgeNotFound(knowledge_id.to_string()))?;

        let turns = match self
            .store
            .get_branch(&self.user_id, &knowledge.source_branch_id)
            .await
        {
            Ok(Some(branch)) => branch.turns,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(knowledge_id = %knowledge_id, error = %e, "Branch transcript unavailable");
                Vec::new()
            }
        };

        Ok(BranchView { knowledge, turns })
    }

    /// Start a new branch on the same parent message as `view`.
    ///
    /// The original knowledge is left untouched.
    pub async fn continue_from(
        &self,
        view: &BranchView,
        snapshot: &ConversationSnapshot,
    ) -> Result<BranchId> {
        if snapshot.conversation_id != view.knowledge.conversation_id {
            return Err(Error::InvalidInput(format!(
                "Knowledge {} belongs to conversation {}, not {}",
                view.knowledge.id, view.knowledge.conversation_id, snapshot.conversation_id
            )));
        }
        self.start_branch(
            snapshot,
            &view.knowledge.parent_message_id,
            &view.knowledge.selected_text,
            Some(view.knowledge.id.clone()),
        )
        .await
    }

    // ── Internals ────────────────────────────────────────────────────────

    async fn start_branch(
        &self,
        snapshot: &ConversationSnapshot,
        parent_message_id: &str,
        selected_text: &str,
        continued_from: Option<KnowledgeId>,
    ) -> Result<BranchId> {
        if snapshot.user_id != self.user_id {
            return Err(Error::InvalidInput(format!(
                "Conversation {} belongs to another user",
                snapshot.conversation_id
            )));
        }
        if parent_message_id.trim().is_empty() {
            return Err(Error::InvalidInput("Parent message id must not be empty".into()));
        }
        let parent = snapshot.message(parent_message_id).ok_or_else(|| {
            Error::InvalidInput(format!(
                "Message {parent_message_id} not found in conversation {}",
                snapshot.conversation_id
            ))
        })?;

        let mut branch = SubChatBranch::open(
            snapshot.conversation_id.clone(),
            parent_message_id,
            parent.content.clone(),
            selected_text,
        );
        branch.continued_from = continued_from;
        let id = branch.id.clone();

        self.set_state(&mut branch, BranchState::Active).await?;
        info!(
            branch_id = %id,
            conversation_id = %snapshot.conversation_id,
            parent_message_id,
            continued = branch.continued_from.is_some(),
            "Branch opened"
        );
        Ok(id)
    }

    async fn load(&self, branch_id: &BranchId) -> Result<SubChatBranch> {
        self.store
            .get_branch(&self.user_id, branch_id)
            .await?
            .ok_or_else(|| Error::BranchNotFound(branch_id.to_string()))
    }

    /// Transition, persist, then publish.
    async fn set_state(&self, branch: &mut SubChatBranch, next: BranchState) -> Result<()> {
        let from = branch.state;
        if !branch.transition(next) {
            return Err(invalid_state(branch, "transition"));
        }
        self.store.put_branch(&self.user_id, branch.clone()).await?;
        self.events.publish(BranchEvent::StateChanged {
            branch_id: branch.id.clone(),
            conversation_id: branch.conversation_id.clone(),
            from,
            to: next,
            timestamp: branch.updated_at,
        });
        Ok(())
    }

    /// Run the primary summarizer under the merge timeout, falling back to
    /// the extractive summary. The flag is true when the fallback was used.
    async fn summarize(&self, branch: &SubChatBranch) -> (KnowledgeSummary, bool) {
        let request = SummarizationRequest {
            turns: branch.turns.clone(),
            selected_text: branch.selected_text.clone(),
            parent_message: branch.parent_message_content.clone(),
        };

        let outcome =
            tokio::time::timeout(self.merge_timeout, self.summarizer.summarize(&request)).await;
        match outcome {
            Ok(Ok(summary)) if !summary.short_summary.trim().is_empty() => (summary, false),
            Ok(Ok(_)) => {
                warn!(
                    branch_id = %branch.id,
                    summarizer = self.summarizer.name(),
                    "Summarizer returned an empty summary, using extractive fallback"
                );
                (self.fallback.extract(&request), true)
            }
            Ok(Err(e)) => {
                warn!(
                    branch_id = %branch.id,
                    summarizer = self.summarizer.name(),
                    error = %e,
                    "Summarizer failed, using extractive fallback"
                );
                (self.fallback.extract(&request), true)
            }
            Err(_) => {
                warn!(
                    branch_id = %branch.id,
                    summarizer = self.summarizer.name(),
                    timeout_ms = self.merge_timeout.as_millis() as u64,
                    "Summarizer timed out, using extractive fallback"
                );
                (self.fallback.extract(&request), true)
            }
        }
    }
}

fn invalid_state(branch: &SubChatBranch, operation: &'static str) -> Error {
    Error::InvalidBranchState {
        branch_id: branch.id.to_string(),
        state: branch.state,
        operation,
    }
}
