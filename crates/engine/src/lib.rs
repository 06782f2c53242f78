//! The SideChat engine — branch lifecycle, merge and context composition.
//!
//! A user session works in three steps:
//!
//! 1. **Branch**: [`SubChatEngine::open_branch`] on an assistant message,
//!    then exchange turns with [`SubChatEngine::append_turn`]
//! 2. **Merge**: [`SubChatEngine::request_merge`] summarizes the branch
//!    (falling back to an extractive summary) and stores the knowledge
//! 3. **Compose**: on every later user turn, [`ContextComposer::compose`]
//!    builds the token-bounded context bundle for the LLM call
//!
//! The [`sweeper`] task keeps the cross-conversation index within its
//! retention window in between merges.

pub mod context;
pub mod subchat;
pub mod summarizer;
pub mod sweeper;

#[cfg(test)]
mod test_helpers;

pub use context::{ComposeRequest, ComposerSettings, ContextComposer};
pub use subchat::{BranchView, MergeOutcome, SubChatEngine};
pub use summarizer::{ExtractiveSummarizer, LlmSummarizer, build_summarizer};
