//! DocumentRetriever trait — ranked chunks from user-attached documents.
//!
//! Retrieval itself is an external collaborator; SideChat only consumes its
//! results.

use crate::error::RetrievalError;
use crate::message::ConversationId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A retrieved chunk of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    /// Human-readable source label (filename, URL, etc.)
    pub source_label: String,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>, source_label: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_label: source_label.into(),
        }
    }
}

#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    /// Best-ranked chunks first, at most `top_k`.
    async fn search(
        &self,
        query: &str,
        conversation_id: &ConversationId,
        top_k: usize,
    ) -> Result<Vec<DocumentChunk>, RetrievalError>;
}
