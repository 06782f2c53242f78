//! Identifiers, turns, and the read-only conversation snapshot.
//!
//! The primary conversation store is an external collaborator. SideChat only
//! ever sees a [`ConversationSnapshot`] handed in by the caller: the messages
//! that exist right now and the conversation's cross-conversation opt-in flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// The user that owns a session. Every stored record is scoped by it.
    UserId,
    "usr_"
);
string_id!(
    /// Unique identifier for a conversation (owned by the CRUD collaborator).
    ConversationId,
    "conv_"
);
string_id!(
    /// Unique identifier for a SubChat branch.
    BranchId,
    "br_"
);
string_id!(
    /// Identifier of a merged-knowledge record, derived from its branch id.
    KnowledgeId,
    "mk_"
);

impl KnowledgeId {
    /// The knowledge id produced by merging the given branch.
    pub fn for_branch(branch_id: &BranchId) -> Self {
        Self(format!("mk_{}", branch_id.0))
    }
}

/// The role of a message or turn author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// A single exchange inside a SubChat branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A message in the parent conversation, as seen by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
        }
    }
}

/// Read-only view of a conversation at the moment an operation is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub user_id: UserId,
    pub conversation_id: ConversationId,

    /// Ordered messages currently in the conversation
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Whether knowledge merged in other conversations may be used here
    #[serde(default)]
    pub use_cross_conversation_knowledge: bool,
}

impl ConversationSnapshot {
    pub fn new(user_id: UserId, conversation_id: ConversationId) -> Self {
        Self {
            user_id,
            conversation_id,
            messages: Vec::new(),
            use_cross_conversation_knowledge: false,
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_cross_conversation(mut self, enabled: bool) -> Self {
        self.use_cross_conversation_knowledge = enabled;
        self
    }

    /// Find a message by id.
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}
