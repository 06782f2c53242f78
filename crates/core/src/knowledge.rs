//! Merged knowledge — the distilled result of a SubChat branch.
//!
//! A record is created exactly once, when its branch is merged, and is never
//! edited afterwards. It lives in two scopes: the owning conversation, and a
//! per-user cross-conversation index holding an independent copy.

use crate::branch::SubChatBranch;
use crate::message::{BranchId, ConversationId, KnowledgeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a knowledge record is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeScope {
    /// Visible to the conversation that produced it
    Conversation,
    /// Visible to any conversation of the same user that opts in
    CrossConversation,
}

impl KnowledgeScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::CrossConversation => "cross_conversation",
        }
    }
}

/// What a summarizer produces for a branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSummary {
    /// About one sentence
    pub short_summary: String,
    /// Several sentences
    pub detailed_summary: String,
    /// A short topic label
    pub topic: String,
}

/// A merged SubChat, reusable as context for later turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedKnowledge {
    pub id: KnowledgeId,
    pub conversation_id: ConversationId,
    pub parent_message_id: String,
    pub source_branch_id: BranchId,

    #[serde(default)]
    pub selected_text: String,

    pub short_summary: String,
    pub detailed_summary: String,
    pub topic: String,

    /// Number of user turns in the source branch
    pub question_count: usize,

    pub merged_at: DateTime<Utc>,

    /// Whether the summary came from the extractive fallback
    #[serde(default)]
    pub fallback: bool,
}

impl MergedKnowledge {
    /// Build the record for a branch from a summary.
    pub fn from_branch(
        branch: &SubChatBranch,
        summary: KnowledgeSummary,
        merged_at: DateTime<Utc>,
        fallback: bool,
    ) -> Self {
        Self {
            id: KnowledgeId::for_branch(&branch.id),
            conversation_id: branch.conversation_id.clone(),
            parent_message_id: branch.parent_message_id.clone(),
            source_branch_id: branch.id.clone(),
            selected_text: branch.selected_text.clone(),
            short_summary: summary.short_summary,
            detailed_summary: summary.detailed_summary,
            topic: summary.topic,
            question_count: branch.question_count(),
            merged_at,
            fallback,
        }
    }

    /// Marker line that opens the transcript block for `id`.
    pub fn transcript_marker(id: &KnowledgeId) -> String {
        format!("<!-- merged-knowledge:{} -->", id)
    }

    /// Render a human-readable markdown block for transcripts and exports.
    ///
    /// Export only: stores keep the structured record and never parse this.
    pub fn to_transcript_block(&self) -> String {
        let mut out = String::new();
        out.push_str(&Self::transcript_marker(&self.id));
        out.push('\n');
        out.push_str(&format!("### Side discussion: {}\n\n", self.topic));
        if !self.selected_text.is_empty() {
            out.push_str(&format!("> {}\n\n", self.selected_text.replace('\n', "\n> ")));
        }
        out.push_str(&format!("**Summary:** {}\n\n", self.short_summary));
        out.push_str(&self.detailed_summary);
        out.push_str("\n\n");
        out.push_str(&format!(
            "_{} question{} · merged {}_\n",
            self.question_count,
            if self.question_count == 1 { "" } else { "s" },
            self.merged_at.format("%Y-%m-%d %H:%M UTC"),
        ));
        out
    }
}
