//! End-to-end scenarios for SideChat.
//!
//! These tests drive the full path from opening a branch to composing the
//! context of a later turn, against real store backends.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use sidechat_core::bundle::{DegradedSignal, SectionSource};
use sidechat_core::completion::CompletionProvider;
use sidechat_core::error::{CompletionError, RetrievalError, SummarizationError};
use sidechat_core::knowledge::{KnowledgeSummary, MergedKnowledge};
use sidechat_core::message::{
    BranchId, ConversationId, ConversationSnapshot, KnowledgeId, Message, Role, UserId,
};
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::retrieval::{DocumentChunk, DocumentRetriever};
use sidechat_core::store::BranchStore;
use sidechat_core::summarizer::{SummarizationRequest, Summarizer};
use sidechat_core::{BranchState, ContextBundle};
use sidechat_engine::{ComposeRequest, ContextComposer, LlmSummarizer, SubChatEngine, sweeper};
use sidechat_store::{FileStore, InMemoryStore, SqliteStore};

// ── Mocks ────────────────────────────────────────────────────────────────

/// Returns the same summary for every branch.
struct FixedSummarizer(KnowledgeSummary);

impl FixedSummarizer {
    fn retries() -> Self {
        Self(KnowledgeSummary {
            short_summary: "Discussed retry backoff".into(),
            detailed_summary: "Backoff doubles the delay after each failed upload.".into(),
            topic: "retries".into(),
        })
    }
}

#[async_trait::async_trait]
impl Summarizer for FixedSummarizer {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn summarize(
        &self,
        _request: &SummarizationRequest,
    ) -> Result<KnowledgeSummary, SummarizationError> {
        Ok(self.0.clone())
    }
}

struct BrokenSummarizer;

#[async_trait::async_trait]
impl Summarizer for BrokenSummarizer {
    fn name(&self) -> &str {
        "broken"
    }

    async fn summarize(
        &self,
        _request: &SummarizationRequest,
    ) -> Result<KnowledgeSummary, SummarizationError> {
        Err(SummarizationError::Failed("rate limited".into()))
    }
}

struct StalledSummarizer;

#[async_trait::async_trait]
impl Summarizer for StalledSummarizer {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn summarize(
        &self,
        _request: &SummarizationRequest,
    ) -> Result<KnowledgeSummary, SummarizationError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(SummarizationError::Failed("unreachable".into()))
    }
}

/// A completion provider that answers with a fenced JSON summary.
struct FencedJsonProvider;

#[async_trait::async_trait]
impl CompletionProvider for FencedJsonProvider {
    fn name(&self) -> &str {
        "fenced"
    }

    async fn complete(
        &self,
        prompt: &str,
        _context: &ContextBundle,
    ) -> Result<String, CompletionError> {
        assert!(prompt.contains("the retry logic"));
        Ok("```json\n{\"short_summary\": \"Discussed retry backoff\", \"detailed_summary\": \"Use jitter.\", \"topic\": \"Retries\"}\n```".into())
    }
}

struct SingleChunkRetriever(usize);

#[async_trait::async_trait]
impl DocumentRetriever for SingleChunkRetriever {
    async fn search(
        &self,
        _query: &str,
        _conversation_id: &ConversationId,
        _top_k: usize,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        Ok(vec![DocumentChunk::new("d".repeat(self.0), "manual.pdf")])
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn conversation(user: &str, id: &str) -> ConversationSnapshot {
    ConversationSnapshot::new(UserId::from(user), ConversationId::from(id))
        .with_message(Message::new("m0", Role::User, "How do uploads recover?"))
        .with_message(Message::new(
            "m1",
            Role::Assistant,
            "Uploads that fail go through the retry logic, up to three times.",
        ))
}

async fn merge_one(engine: &SubChatEngine, snapshot: &ConversationSnapshot) -> MergedKnowledge {
    let id = engine
        .open_branch(snapshot, "m1", "the retry logic")
        .await
        .unwrap();
    engine
        .append_turn(&id, Role::User, "Why exponential backoff?")
        .await
        .unwrap();
    engine
        .append_turn(&id, Role::Assistant, "So retries do not pile up.")
        .await
        .unwrap();
    engine.request_merge(&id).await.unwrap().knowledge
}

fn seeded(id: &str, conversation: &str, minutes_ago: i64) -> MergedKnowledge {
    MergedKnowledge {
        id: KnowledgeId::from(id),
        conversation_id: ConversationId::from(conversation),
        parent_message_id: "m1".into(),
        source_branch_id: BranchId::from(format!("br_{id}")),
        selected_text: String::new(),
        short_summary: format!("Summary {id}"),
        detailed_summary: String::new(),
        topic: id.into(),
        question_count: 1,
        merged_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        fallback: false,
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn merged_branch_leads_next_composition() {
    let store: Arc<dyn BranchStore> = Arc::new(InMemoryStore::new());
    let engine = SubChatEngine::new(
        UserId::from("alice"),
        store.clone(),
        Arc::new(FixedSummarizer::retries()),
    );
    let snapshot = conversation("alice", "c1");

    let knowledge = merge_one(&engine, &snapshot).await;
    assert_eq!(knowledge.question_count, 1);
    assert_eq!(knowledge.topic, "retries");
    assert_eq!(knowledge.parent_message_id, "m1");
    assert_eq!(knowledge.selected_text, "the retry logic");

    let composer = ContextComposer::new(store, RetentionPolicy::default());
    let bundle = composer
        .compose(&ComposeRequest {
            snapshot: &snapshot,
            token_budget: 2048,
            document_query: None,
            now: Utc::now(),
        })
        .await;

    let first = &bundle.sections[0];
    assert_eq!(first.source, SectionSource::BranchLocal);
    assert_eq!(first.origin, knowledge.id.to_string());
    assert!(first.text.contains("Discussed retry backoff"));
    assert!(bundle.estimated_tokens <= 2048);
}

#[tokio::test]
async fn fifty_first_merge_evicts_oldest_cross_record() {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::from("alice");
    let policy = RetentionPolicy::default();
    for i in 0..50 {
        let k = seeded(&format!("k{i:02}"), "c_old", 100 - i);
        store.put_knowledge(&user, k, &policy, Utc::now()).await.unwrap();
    }

    let engine = SubChatEngine::new(
        user.clone(),
        store.clone(),
        Arc::new(FixedSummarizer::retries()),
    );
    let snapshot = conversation("alice", "c1");
    let id = engine.open_branch(&snapshot, "m1", "").await.unwrap();
    engine.append_turn(&id, Role::User, "And the 51st?").await.unwrap();
    let outcome = engine.request_merge(&id).await.unwrap();

    assert_eq!(outcome.evicted, vec![KnowledgeId::from("k00")]);
    let cross = store.list_cross_conversation(&user).await.unwrap();
    assert_eq!(cross.len(), 50);
    assert!(cross.iter().all(|k| k.id.as_str() != "k00"));
    assert!(cross.iter().any(|k| k.id == outcome.knowledge.id));

    // Conversation scope of the evicted record is untouched
    assert_eq!(
        store
            .list_by_conversation(&user, &ConversationId::from("c_old"))
            .await
            .unwrap()
            .len(),
        50
    );
}

#[tokio::test]
async fn broken_summarizer_still_merges() {
    let engine = SubChatEngine::new(
        UserId::from("alice"),
        Arc::new(InMemoryStore::new()),
        Arc::new(BrokenSummarizer),
    );
    let snapshot = conversation("alice", "c1");

    let knowledge = merge_one(&engine, &snapshot).await;
    assert!(knowledge.fallback);
    assert_eq!(knowledge.short_summary, "Why exponential backoff?");
    assert!(knowledge.detailed_summary.contains("the retry logic"));
    assert!(knowledge.detailed_summary.contains("So retries do not pile up."));
}

#[tokio::test(start_paused = true)]
async fn stalled_summarizer_hits_merge_timeout() {
    let engine = SubChatEngine::new(
        UserId::from("alice"),
        Arc::new(InMemoryStore::new()),
        Arc::new(StalledSummarizer),
    )
    .with_merge_timeout(Duration::from_secs(8));
    let snapshot = conversation("alice", "c1");

    let started = tokio::time::Instant::now();
    let knowledge = merge_one(&engine, &snapshot).await;
    assert!(knowledge.fallback);
    assert!(started.elapsed() < Duration::from_secs(9));
    let branch = engine.branch(&knowledge.source_branch_id).await.unwrap();
    assert_eq!(branch.state, BranchState::Merged);
}

#[tokio::test]
async fn llm_summarizer_parses_fenced_reply() {
    let engine = SubChatEngine::new(
        UserId::from("alice"),
        Arc::new(InMemoryStore::new()),
        Arc::new(LlmSummarizer::new(Arc::new(FencedJsonProvider))),
    );
    let knowledge = merge_one(&engine, &conversation("alice", "c1")).await;
    assert!(!knowledge.fallback);
    assert_eq!(knowledge.topic, "Retries");
    assert_eq!(knowledge.detailed_summary, "Use jitter.");
}

#[tokio::test]
async fn cross_conversation_knowledge_is_opt_in_and_last() {
    let store: Arc<dyn BranchStore> = Arc::new(InMemoryStore::new());
    let engine = SubChatEngine::new(
        UserId::from("alice"),
        store.clone(),
        Arc::new(FixedSummarizer::retries()),
    );
    let earlier = merge_one(&engine, &conversation("alice", "c_earlier")).await;
    let local = merge_one(&engine, &conversation("alice", "c1")).await;

    let composer = ContextComposer::new(store, RetentionPolicy::default())
        .with_retriever(Arc::new(SingleChunkRetriever(40)));
    let snapshot = conversation("alice", "c1").with_cross_conversation(true);
    let bundle = composer
        .compose(&ComposeRequest {
            snapshot: &snapshot,
            token_budget: 4096,
            document_query: Some("retry"),
            now: Utc::now(),
        })
        .await;

    let order: Vec<(SectionSource, &str)> = bundle
        .sections
        .iter()
        .map(|s| (s.source, s.origin.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (SectionSource::BranchLocal, local.id.as_str()),
            (SectionSource::Document, "manual.pdf"),
            (SectionSource::BranchCross, earlier.id.as_str()),
        ]
    );
}

#[tokio::test]
async fn cross_knowledge_dropped_whole_when_budget_runs_out() {
    let store: Arc<dyn BranchStore> = Arc::new(InMemoryStore::new());
    let engine = SubChatEngine::new(
        UserId::from("alice"),
        store.clone(),
        Arc::new(FixedSummarizer::retries()),
    );
    merge_one(&engine, &conversation("alice", "c_earlier")).await;
    merge_one(&engine, &conversation("alice", "c1")).await;

    let composer = ContextComposer::new(store, RetentionPolicy::default())
        .with_retriever(Arc::new(SingleChunkRetriever(400)));
    let snapshot = conversation("alice", "c1").with_cross_conversation(true);

    let unbounded = composer
        .compose(&ComposeRequest {
            snapshot: &snapshot,
            token_budget: 100_000,
            document_query: Some("retry"),
            now: Utc::now(),
        })
        .await;
    assert_eq!(unbounded.sections.len(), 3);

    // Room for local + document but one token short of the cross section
    let budget = unbounded.sections[0].tokens + unbounded.sections[1].tokens
        + unbounded.sections[2].tokens
        - 1;
    let bundle = composer
        .compose(&ComposeRequest {
            snapshot: &snapshot,
            token_budget: budget,
            document_query: Some("retry"),
            now: Utc::now(),
        })
        .await;
    assert_eq!(bundle.sections.len(), 2);
    assert!(bundle.from_source(SectionSource::BranchCross).next().is_none());
    assert!(bundle.sections.iter().all(|s| !s.truncated));
    assert_eq!(bundle.dropped, 1);
}

#[tokio::test]
async fn expired_knowledge_excluded_then_swept_from_cross_index() {
    let store = Arc::new(InMemoryStore::new());
    let user = UserId::from("alice");
    let policy = RetentionPolicy::default();
    let stale = seeded("stale", "c1", 60 * 24 * 31);
    let at = stale.merged_at;
    store.put_knowledge(&user, stale, &policy, at).await.unwrap();

    let composer = ContextComposer::new(store.clone(), policy.clone());
    let snapshot = conversation("alice", "c1").with_cross_conversation(true);
    let bundle = composer
        .compose(&ComposeRequest {
            snapshot: &snapshot,
            token_budget: 2048,
            document_query: None,
            now: Utc::now(),
        })
        .await;
    assert!(bundle.is_empty());

    let report = sweeper::sweep_once(store.as_ref(), &policy, Utc::now())
        .await
        .unwrap();
    assert_eq!(report.cross_conversation_removed, 1);
    assert!(store.list_cross_conversation(&user).await.unwrap().is_empty());
    assert_eq!(
        store
            .list_by_conversation(&user, &ConversationId::from("c1"))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn reopen_then_continue_keeps_original_knowledge() {
    let store: Arc<dyn BranchStore> = Arc::new(InMemoryStore::new());
    let engine = SubChatEngine::new(
        UserId::from("alice"),
        store.clone(),
        Arc::new(FixedSummarizer::retries()),
    );
    let snapshot = conversation("alice", "c1");
    let knowledge = merge_one(&engine, &snapshot).await;

    let view = engine.reopen(&knowledge.id).await.unwrap();
    assert_eq!(view.turns.len(), 2);

    let next = engine.continue_from(&view, &snapshot).await.unwrap();
    engine.append_turn(&next, Role::User, "What about jitter?").await.unwrap();
    let second = engine.request_merge(&next).await.unwrap().knowledge;

    assert_ne!(second.id, knowledge.id);
    assert_eq!(second.parent_message_id, "m1");
    assert_eq!(
        store
            .get_knowledge(&UserId::from("alice"), &knowledge.id)
            .await
            .unwrap(),
        Some(knowledge)
    );
    let badges = engine
        .branches_for_message(&snapshot.conversation_id, "m1")
        .await
        .unwrap();
    assert_eq!(badges.len(), 2);
}

#[tokio::test]
async fn retrieval_failure_is_reported_not_fatal() {
    struct Offline;

    #[async_trait::async_trait]
    impl DocumentRetriever for Offline {
        async fn search(
            &self,
            _query: &str,
            _conversation_id: &ConversationId,
            _top_k: usize,
        ) -> Result<Vec<DocumentChunk>, RetrievalError> {
            Err(RetrievalError::Failed("index offline".into()))
        }
    }

    let composer = ContextComposer::new(Arc::new(InMemoryStore::new()), RetentionPolicy::default())
        .with_retriever(Arc::new(Offline));
    let snapshot = conversation("alice", "c1");
    let bundle = composer
        .compose(&ComposeRequest {
            snapshot: &snapshot,
            token_budget: 512,
            document_query: Some("anything"),
            now: Utc::now(),
        })
        .await;
    assert!(bundle.is_degraded());
    assert!(matches!(bundle.degraded[0], DegradedSignal::RetrievalFailed { .. }));
}

#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("knowledge.jsonl");
    let snapshot = conversation("alice", "c1");

    let knowledge = {
        let engine = SubChatEngine::new(
            UserId::from("alice"),
            Arc::new(FileStore::new(path.clone())),
            Arc::new(FixedSummarizer::retries()),
        );
        merge_one(&engine, &snapshot).await
    };

    let reopened: Arc<dyn BranchStore> = Arc::new(FileStore::new(path));
    let engine = SubChatEngine::new(
        UserId::from("alice"),
        reopened.clone(),
        Arc::new(FixedSummarizer::retries()),
    );
    let view = engine.reopen(&knowledge.id).await.unwrap();
    assert_eq!(view.knowledge, knowledge);
    assert_eq!(view.turns.len(), 2);

    let bundle = ContextComposer::new(reopened, RetentionPolicy::default())
        .compose(&ComposeRequest {
            snapshot: &snapshot,
            token_budget: 2048,
            document_query: None,
            now: Utc::now(),
        })
        .await;
    assert_eq!(bundle.sections.len(), 1);
}

#[tokio::test]
async fn sqlite_store_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("sidechat.sqlite").display());
    let snapshot = conversation("alice", "c1");

    let knowledge = {
        let store = Arc::new(SqliteStore::new(&url).await.unwrap());
        let engine = SubChatEngine::new(
            UserId::from("alice"),
            store,
            Arc::new(FixedSummarizer::retries()),
        );
        merge_one(&engine, &snapshot).await
    };

    let store = SqliteStore::new(&url).await.unwrap();
    let user = UserId::from("alice");
    let branch = store
        .get_branch(&user, &knowledge.source_branch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(branch.state, BranchState::Merged);
    assert_eq!(
        store.get_knowledge(&user, &knowledge.id).await.unwrap(),
        Some(knowledge)
    );
}
