//! SubChat branches and their lifecycle states.
//!
//! ```text
//! open ──► active ──► merging ──► merged
//!             │
//!             └─────► discarded
//! ```
//!
//! `open` is transient: a branch is persisted as `active` as soon as it is
//! created. `merged` and `discarded` are terminal.

use crate::message::{BranchId, ConversationId, KnowledgeId, Role, Turn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a SubChat branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchState {
    Open,
    Active,
    Merging,
    Merged,
    Discarded,
}

impl BranchState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: BranchState) -> bool {
        use BranchState::*;
        matches!(
            (self, next),
            (Open, Active)
                | (Active, Merging)
                | (Active, Discarded)
                | (Merging, Merged)
                // a failed knowledge write hands the branch back to the user
                | (Merging, Active)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Merged | Self::Discarded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Active => "active",
            Self::Merging => "merging",
            Self::Merged => "merged",
            Self::Discarded => "discarded",
        }
    }
}

impl std::fmt::Display for BranchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BranchState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "active" => Ok(Self::Active),
            "merging" => Ok(Self::Merging),
            "merged" => Ok(Self::Merged),
            "discarded" => Ok(Self::Discarded),
            other => Err(format!("unknown branch state '{other}'")),
        }
    }
}

/// An isolated side conversation spawned from a parent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubChatBranch {
    pub id: BranchId,

    /// Conversation that owns the parent message
    pub conversation_id: ConversationId,

    /// The message this branch was spawned from
    pub parent_message_id: String,

    /// Content of the parent message at branch time (immutable history)
    #[serde(default)]
    pub parent_message_content: String,

    /// Selected snippet; empty means "the whole message"
    #[serde(default)]
    pub selected_text: String,

    #[serde(default)]
    pub turns: Vec<Turn>,

    pub state: BranchState,

    /// Knowledge this branch continues from, if opened via "continue"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continued_from: Option<KnowledgeId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubChatBranch {
    /// Create a branch in the `open` state.
    pub fn open(
        conversation_id: ConversationId,
        parent_message_id: impl Into<String>,
        parent_message_content: impl Into<String>,
        selected_text: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: BranchId::new(),
            conversation_id,
            parent_message_id: parent_message_id.into(),
            parent_message_content: parent_message_content.into(),
            selected_text: selected_text.into(),
            turns: Vec::new(),
            state: BranchState::Open,
            continued_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next` if the transition is legal. Returns `false` and leaves
    /// the branch untouched otherwise.
    pub fn transition(&mut self, next: BranchState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.updated_at = Utc::now();
        true
    }

    /// Number of user turns, i.e. questions asked inside the branch.
    pub fn question_count(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::User).count()
    }

    pub fn first_turn(&self) -> Option<&Turn> {
        self.turns.first()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}
