//! Stub collaborators shared by the engine's unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sidechat_core::branch::SubChatBranch;
use sidechat_core::bundle::ContextBundle;
use sidechat_core::completion::CompletionProvider;
use sidechat_core::error::{CompletionError, RetrievalError, StoreError, SummarizationError};
use sidechat_core::knowledge::{KnowledgeSummary, MergedKnowledge};
use sidechat_core::message::{
    BranchId, ConversationId, ConversationSnapshot, KnowledgeId, Message, Role, UserId,
};
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::retrieval::{DocumentChunk, DocumentRetriever};
use sidechat_core::store::{BranchStore, SweepReport, WriteReport};
use sidechat_core::summarizer::{SummarizationRequest, Summarizer};
use sidechat_store::InMemoryStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A conversation whose message "m1" is an assistant reply about retries.
pub fn snapshot(user: &str, conversation: &str) -> ConversationSnapshot {
    ConversationSnapshot::new(UserId::from(user), ConversationId::from(conversation)).with_message(
        Message::new(
            "m1",
            Role::Assistant,
            "Failed uploads go through the retry logic with exponential backoff.",
        ),
    )
}

pub fn knowledge_at(id: &str, conversation: &str, merged_at: DateTime<Utc>) -> MergedKnowledge {
    MergedKnowledge {
        id: KnowledgeId::from(id),
        conversation_id: ConversationId::from(conversation),
        parent_message_id: "m1".into(),
        source_branch_id: BranchId::from(format!("br_{id}")),
        selected_text: String::new(),
        short_summary: format!("Summary of {id}"),
        detailed_summary: String::new(),
        topic: id.to_string(),
        question_count: 1,
        merged_at,
        fallback: false,
    }
}

// ── Summarizers ──────────────────────────────────────────────────────────

pub struct StaticSummarizer {
    summary: KnowledgeSummary,
}

impl StaticSummarizer {
    pub fn new(short: &str, detailed: &str, topic: &str) -> Self {
        Self {
            summary: KnowledgeSummary {
                short_summary: short.into(),
                detailed_summary: detailed.into(),
                topic: topic.into(),
            },
        }
    }

    pub fn retries() -> Self {
        Self::new(
            "Discussed retry backoff",
            "Exponential backoff with jitter spreads retries out.",
            "retries",
        )
    }

    pub fn summary(&self) -> KnowledgeSummary {
        self.summary.clone()
    }
}

#[async_trait]
impl Summarizer for StaticSummarizer {
    fn name(&self) -> &str {
        "static"
    }

    async fn summarize(
        &self,
        _request: &SummarizationRequest,
    ) -> Result<KnowledgeSummary, SummarizationError> {
        Ok(self.summary.clone())
    }
}

pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn summarize(
        &self,
        _request: &SummarizationRequest,
    ) -> Result<KnowledgeSummary, SummarizationError> {
        Err(SummarizationError::Failed("model unavailable".into()))
    }
}

/// Never answers.
pub struct HangingSummarizer;

#[async_trait]
impl Summarizer for HangingSummarizer {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn summarize(
        &self,
        _request: &SummarizationRequest,
    ) -> Result<KnowledgeSummary, SummarizationError> {
        std::future::pending().await
    }
}

// ── Retrievers ───────────────────────────────────────────────────────────

pub struct FixedRetriever {
    chunks: Vec<DocumentChunk>,
    error: Option<String>,
}

impl FixedRetriever {
    pub fn new(chunks: Vec<DocumentChunk>) -> Self {
        Self {
            chunks,
            error: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            chunks: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

#[async_trait]
impl DocumentRetriever for FixedRetriever {
    async fn search(
        &self,
        _query: &str,
        _conversation_id: &ConversationId,
        _top_k: usize,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        match &self.error {
            Some(reason) => Err(RetrievalError::Failed(reason.clone())),
            None => Ok(self.chunks.clone()),
        }
    }
}

pub struct HangingRetriever;

#[async_trait]
impl DocumentRetriever for HangingRetriever {
    async fn search(
        &self,
        _query: &str,
        _conversation_id: &ConversationId,
        _top_k: usize,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        std::future::pending().await
    }
}

// ── Completion ───────────────────────────────────────────────────────────

pub struct ScriptedProvider {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _prompt: &str,
        _context: &ContextBundle,
    ) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(CompletionError::Failed)
    }
}

// ── Stores ───────────────────────────────────────────────────────────────

fn unavailable() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

/// Every call fails as unavailable.
pub struct FailingStore;

#[async_trait]
impl BranchStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get_branch(
        &self,
        _user: &UserId,
        _id: &BranchId,
    ) -> Result<Option<SubChatBranch>, StoreError> {
        Err(unavailable())
    }

    async fn put_branch(&self, _user: &UserId, _branch: SubChatBranch) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn list_branches(
        &self,
        _user: &UserId,
        _conversation: &ConversationId,
    ) -> Result<Vec<SubChatBranch>, StoreError> {
        Err(unavailable())
    }

    async fn get_knowledge(
        &self,
        _user: &UserId,
        _id: &KnowledgeId,
    ) -> Result<Option<MergedKnowledge>, StoreError> {
        Err(unavailable())
    }

    async fn put_knowledge(
        &self,
        _user: &UserId,
        _knowledge: MergedKnowledge,
        _policy: &RetentionPolicy,
        _now: DateTime<Utc>,
    ) -> Result<WriteReport, StoreError> {
        Err(unavailable())
    }

    async fn list_by_conversation(
        &self,
        _user: &UserId,
        _conversation: &ConversationId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        Err(unavailable())
    }

    async fn list_cross_conversation(
        &self,
        _user: &UserId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        Err(unavailable())
    }

    async fn delete_expired(
        &self,
        _policy: &RetentionPolicy,
        _now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError> {
        Err(unavailable())
    }
}

/// In-memory store whose knowledge writes can be switched to fail.
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_knowledge: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_knowledge: AtomicBool::new(false),
        }
    }

    pub fn fail_knowledge_writes(&self, fail: bool) {
        self.fail_knowledge.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BranchStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get_branch(
        &self,
        user: &UserId,
        id: &BranchId,
    ) -> Result<Option<SubChatBranch>, StoreError> {
        self.inner.get_branch(user, id).await
    }

    async fn put_branch(&self, user: &UserId, branch: SubChatBranch) -> Result<(), StoreError> {
        self.inner.put_branch(user, branch).await
    }

    async fn list_branches(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<SubChatBranch>, StoreError> {
        self.inner.list_branches(user, conversation).await
    }

    async fn get_knowledge(
        &self,
        user: &UserId,
        id: &KnowledgeId,
    ) -> Result<Option<MergedKnowledge>, StoreError> {
        self.inner.get_knowledge(user, id).await
    }

    async fn put_knowledge(
        &self,
        user: &UserId,
        knowledge: MergedKnowledge,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<WriteReport, StoreError> {
        if self.fail_knowledge.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.put_knowledge(user, knowledge, policy, now).await
    }

    async fn list_by_conversation(
        &self,
        user: &UserId,
        conversation: &ConversationId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        self.inner.list_by_conversation(user, conversation).await
    }

    async fn list_cross_conversation(
        &self,
        user: &UserId,
    ) -> Result<Vec<MergedKnowledge>, StoreError> {
        self.inner.list_cross_conversation(user).await
    }

    async fn delete_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError> {
        self.inner.delete_expired(policy, now).await
    }
}
