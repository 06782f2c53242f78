//! Context composition — the bounded, deduplicated, prioritized bundle.
//!
//! Assembles the context for one user turn from three sources, in fixed
//! priority order:
//!
//! | Priority | Source | Eligible when | Over budget |
//! |----------|--------|---------------|-------------|
//! | 1 | Branch knowledge of this conversation | always | head-truncated, then stop |
//! | 2 | Document chunks | a query is given | head-truncated, then stop |
//! | 3 | Cross-conversation knowledge | conversation opts in | dropped, then stop |
//!
//! # Determinism
//!
//! Composition is deterministic: identical records, budget and `now` always
//! produce an identical bundle. Records are ranked by `merged_at` (then id),
//! never by wall-clock arrival.

use crate::context::token;
use chrono::{DateTime, Utc};
use sidechat_config::ComposerConfig;
use sidechat_core::bundle::{ContextBundle, ContextSection, DegradedSignal, SectionSource};
use sidechat_core::error::RetrievalError;
use sidechat_core::knowledge::MergedKnowledge;
use sidechat_core::message::{ConversationId, ConversationSnapshot};
use sidechat_core::retention::RetentionPolicy;
use sidechat_core::retrieval::{DocumentChunk, DocumentRetriever};
use sidechat_core::store::BranchStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// Tunables for composition.
#[derive(Debug, Clone)]
pub struct ComposerSettings {
    /// Chunks requested from document retrieval.
    pub document_top_k: usize,
    /// A section that does not fit is truncated only if more than this many
    /// tokens remain.
    pub min_fragment_tokens: usize,
    /// Upper bound on waiting for document retrieval.
    pub retrieval_timeout: Duration,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self::from(&ComposerConfig::default())
    }
}

impl From<&ComposerConfig> for ComposerSettings {
    fn from(config: &ComposerConfig) -> Self {
        Self {
            document_top_k: config.document_top_k,
            min_fragment_tokens: config.min_fragment_tokens,
            retrieval_timeout: config.retrieval_timeout(),
        }
    }
}

/// Inputs for a single composition.
pub struct ComposeRequest<'a> {
    /// The conversation the user is typing in.
    pub snapshot: &'a ConversationSnapshot,
    /// Hard upper bound on `ContextBundle::estimated_tokens`.
    pub token_budget: usize,
    /// Query for document retrieval; `None` skips documents entirely.
    pub document_query: Option<&'a str>,
    /// Reference time for the retention window.
    pub now: DateTime<Utc>,
}

/// A rendered section that has not yet been fitted to the budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source: SectionSource,
    pub origin: String,
    pub text: String,
}

// ── Composer ──────────────────────────────────────────────────────────────

pub struct ContextComposer {
    store: Arc<dyn BranchStore>,
    retriever: Option<Arc<dyn DocumentRetriever>>,
    policy: RetentionPolicy,
    settings: ComposerSettings,
}

impl ContextComposer {
    pub fn new(store: Arc<dyn BranchStore>, policy: RetentionPolicy) -> Self {
        Self {
            store,
            retriever: None,
            policy,
            settings: ComposerSettings::default(),
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn DocumentRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_settings(mut self, settings: ComposerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the context bundle for one turn.
    ///
    /// Never fails: store and retrieval problems shrink the bundle and are
    /// reported in `ContextBundle::degraded`.
    pub async fn compose(&self, request: &ComposeRequest<'_>) -> ContextBundle {
        let snapshot = request.snapshot;
        let mut degraded = Vec::new();

        // 1. Conversation-scoped knowledge
        let all_local = match self
            .store
            .list_by_conversation(&snapshot.user_id, &snapshot.conversation_id)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Conversation knowledge unavailable, composing without it");
                degraded.push(DegradedSignal::StoreUnavailable {
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };
        let local_ids: HashSet<_> = all_local.iter().map(|k| k.id.clone()).collect();
        let local = self.policy.eligible(
            all_local,
            request.now,
            self.policy.max_per_conversation,
        );

        // 2. Cross-conversation knowledge, deduplicated against step 1
        let cross = if snapshot.use_cross_conversation_knowledge {
            match self.store.list_cross_conversation(&snapshot.user_id).await {
                Ok(records) => {
                    let others: Vec<MergedKnowledge> = records
                        .into_iter()
                        .filter(|k| {
                            !local_ids.contains(&k.id)
                                && k.conversation_id != snapshot.conversation_id
                        })
                        .collect();
                    self.policy
                        .eligible(others, request.now, self.policy.max_cross_conversation)
                }
                Err(e) => {
                    warn!(error = %e, "Cross-conversation index unavailable, composing without it");
                    degraded.push(DegradedSignal::StoreUnavailable {
                        reason: e.to_string(),
                    });
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        // 3. Documents
        let documents = match request.document_query.map(str::trim) {
            Some(query) if !query.is_empty() => {
                let (chunks, signal) = self
                    .fetch_documents(query, &snapshot.conversation_id)
                    .await;
                degraded.extend(signal);
                chunks
            }
            _ => Vec::new(),
        };

        // 4. Priority order: local → documents → cross
        let mut candidates = Vec::with_capacity(local.len() + documents.len() + cross.len());
        candidates.extend(
            local
                .iter()
                .filter(|k| !already_in_transcript(k, snapshot))
                .map(|k| knowledge_candidate(k, SectionSource::BranchLocal)),
        );
        candidates.extend(documents.iter().map(document_candidate));
        candidates.extend(
            cross
                .iter()
                .filter(|k| !already_in_transcript(k, snapshot))
                .map(|k| knowledge_candidate(k, SectionSource::BranchCross)),
        );

        // 5. Fit to budget
        let mut bundle = fit_to_budget(
            candidates,
            request.token_budget,
            self.settings.min_fragment_tokens,
        );
        bundle.degraded = degraded;

        debug!(
            conversation_id = %snapshot.conversation_id,
            sections = bundle.sections.len(),
            dropped = bundle.dropped,
            tokens = bundle.estimated_tokens,
            budget = request.token_budget,
            "Context composed"
        );
        bundle
    }

    async fn fetch_documents(
        &self,
        query: &str,
        conversation_id: &ConversationId,
    ) -> (Vec<DocumentChunk>, Option<DegradedSignal>) {
        let Some(retriever) = &self.retriever else {
            debug!("Document query given but no retriever configured");
            return (Vec::new(), None);
        };

        let timeout = self.settings.retrieval_timeout;
        let top_k = self.settings.document_top_k;
        let search = retriever.search(query, conversation_id, top_k);
        match tokio::time::timeout(timeout, search).await {
            Ok(Ok(mut chunks)) => {
                chunks.truncate(top_k);
                (chunks, None)
            }
            Ok(Err(RetrievalError::Timeout { timeout_ms })) => {
                warn!(timeout_ms, "Document retrieval timed out");
                (Vec::new(), Some(DegradedSignal::RetrievalTimeout { timeout_ms }))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Document retrieval failed");
                (
                    Vec::new(),
                    Some(DegradedSignal::RetrievalFailed {
                        reason: e.to_string(),
                    }),
                )
            }
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms, "Document retrieval timed out");
                (Vec::new(), Some(DegradedSignal::RetrievalTimeout { timeout_ms }))
            }
        }
    }
}

// ── Budget walk ───────────────────────────────────────────────────────────

/// Walk `candidates` in order, keeping whole sections while they fit.
///
/// The first section that does not fit is head-truncated into the remaining
/// budget if more than `min_fragment_tokens` remain and its source allows it;
/// either way the walk stops there and every later candidate is dropped.
/// Sections are never reordered to pack the budget more tightly.
pub fn fit_to_budget(
    candidates: Vec<Candidate>,
    token_budget: usize,
    min_fragment_tokens: usize,
) -> ContextBundle {
    let total = candidates.len();
    let mut sections = Vec::new();
    let mut remaining = token_budget;

    for candidate in candidates {
        let tokens = token::estimate_tokens(&candidate.text);
        if tokens <= remaining {
            remaining -= tokens;
            sections.push(ContextSection {
                source: candidate.source,
                origin: candidate.origin,
                text: candidate.text,
                tokens,
                truncated: false,
            });
            continue;
        }

        if remaining > min_fragment_tokens && truncatable(candidate.source) {
            let text = token::truncate_to_tokens(&candidate.text, remaining);
            if !text.is_empty() {
                let tokens = token::estimate_tokens(&text);
                remaining -= tokens;
                sections.push(ContextSection {
                    source: candidate.source,
                    origin: candidate.origin,
                    text,
                    tokens,
                    truncated: true,
                });
            }
        }
        break;
    }

    ContextBundle {
        dropped: total - sections.len(),
        estimated_tokens: token_budget - remaining,
        sections,
        degraded: Vec::new(),
    }
}

/// Knowledge from unrelated conversations is included whole or not at all.
fn truncatable(source: SectionSource) -> bool {
    !matches!(source, SectionSource::BranchCross)
}

// ── Rendering ─────────────────────────────────────────────────────────────

fn knowledge_candidate(k: &MergedKnowledge, source: SectionSource) -> Candidate {
    let heading = match source {
        SectionSource::BranchCross => "Previous knowledge",
        _ => "Branch knowledge",
    };
    let mut text = format!("[{heading}: {}]\n", k.topic);
    if !k.selected_text.is_empty() {
        text.push_str(&format!("About: \"{}\"\n", k.selected_text));
    }
    text.push_str(&k.short_summary);
    text.push('\n');
    if !k.detailed_summary.is_empty() {
        text.push_str(&k.detailed_summary);
        text.push('\n');
    }
    text.push('\n');

    Candidate {
        source,
        origin: k.id.to_string(),
        text,
    }
}

fn document_candidate(chunk: &DocumentChunk) -> Candidate {
    Candidate {
        source: SectionSource::Document,
        origin: chunk.source_label.clone(),
        text: format!("[Document: {}]\n{}\n\n", chunk.source_label, chunk.content),
    }
}

/// The record was already posted into the conversation as a transcript block.
fn already_in_transcript(k: &MergedKnowledge, snapshot: &ConversationSnapshot) -> bool {
    let marker = MergedKnowledge::transcript_marker(&k.id);
    snapshot.messages.iter().any(|m| m.content.contains(&marker))
}
