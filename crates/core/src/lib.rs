//! # SideChat Core
//!
//! Domain types, traits, and error definitions for SideChat: branching side
//! discussions off assistant messages, merging their distilled knowledge
//! back, and composing that knowledge into bounded context for later turns.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here (store, summarizer, document
//! retriever, completion provider). Implementations live in their respective
//! crates or outside this workspace entirely. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod branch;
pub mod bundle;
pub mod completion;
pub mod error;
pub mod event;
pub mod knowledge;
pub mod message;
pub mod retention;
pub mod retrieval;
pub mod store;
pub mod summarizer;

// Re-export key types at crate root for ergonomics
pub use branch::{BranchState, SubChatBranch};
pub use bundle::{ContextBundle, ContextSection, DegradedSignal, SectionSource};
pub use completion::CompletionProvider;
pub use error::{Error, Result};
pub use event::{BranchEvent, SessionEvents, Subscription, SubscriptionId};
pub use knowledge::{KnowledgeScope, KnowledgeSummary, MergedKnowledge};
pub use message::{
    BranchId, ConversationId, ConversationSnapshot, KnowledgeId, Message, Role, Turn, UserId,
};
pub use retention::RetentionPolicy;
pub use retrieval::{DocumentChunk, DocumentRetriever};
pub use store::{BranchStore, SweepReport, WriteReport};
pub use summarizer::{SummarizationRequest, Summarizer};
