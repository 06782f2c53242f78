//! Summarizer trait — the summarization gateway used on merge.
//!
//! Given a branch transcript, produce a short summary, a detailed summary and
//! a topic label. Implementations may fail; the engine owns the fallback.

use crate::error::SummarizationError;
use crate::knowledge::KnowledgeSummary;
use crate::message::Turn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything a summarizer gets to see about a branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationRequest {
    pub turns: Vec<Turn>,
    pub selected_text: String,
    pub parent_message: String,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Implementation name, used in logs.
    fn name(&self) -> &str;

    async fn summarize(
        &self,
        request: &SummarizationRequest,
    ) -> Result<KnowledgeSummary, SummarizationError>;
}
