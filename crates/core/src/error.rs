//! Error types for the SideChat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context (store, summarizer, retrieval, completion) has its own
//! error enum; only store errors are ever surfaced through [`Error`] to callers
//! of the engine. The others are recovered locally.

use crate::branch::BranchState;
use thiserror::Error;

/// The top-level error type for all SideChat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Lifecycle errors ---
    #[error("Invalid branch state: cannot {operation} branch {branch_id} while it is {state}")]
    InvalidBranchState {
        branch_id: String,
        state: BranchState,
        operation: &'static str,
    },

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Merged knowledge not found: {0}")]
    KnowledgeNotFound(String),

    #[error("Branch {0} has no user turns to merge")]
    NothingToMerge(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error means the backing store could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Store(StoreError::Unavailable(_)))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record serialization failed: {0}")]
    Serialization(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum SummarizationError {
    #[error("Summarizer failed: {0}")]
    Failed(String),

    #[error("Summarizer timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Summarizer returned malformed output: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Document retrieval timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Document retrieval failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("Completion request failed: {0}")]
    Failed(String),

    #[error("Completion timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}
