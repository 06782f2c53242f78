//! The context bundle handed to the LLM for a single turn.
//!
//! Computed on every turn and never persisted.

use serde::{Deserialize, Serialize};

/// Where a context section came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionSource {
    /// Knowledge merged in the active conversation
    #[serde(rename = "branch-local")]
    BranchLocal,
    /// Knowledge merged in another conversation of the same user
    #[serde(rename = "branch-cross")]
    BranchCross,
    /// A document-retrieval chunk
    #[serde(rename = "document")]
    Document,
}

impl SectionSource {
    pub fn tag(self) -> &'static str {
        match self {
            Self::BranchLocal => "branch-local",
            Self::BranchCross => "branch-cross",
            Self::Document => "document",
        }
    }
}

/// A single rendered section of context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub source: SectionSource,

    /// Knowledge id or document label the section was rendered from
    pub origin: String,

    /// Fully rendered text, including its heading line
    pub text: String,

    /// Token estimate of `text`
    pub tokens: usize,

    /// Whether `text` was head-truncated to fit the budget
    #[serde(default)]
    pub truncated: bool,
}

/// Why a bundle may be smaller than it could have been.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedSignal {
    RetrievalTimeout { timeout_ms: u64 },
    RetrievalFailed { reason: String },
    StoreUnavailable { reason: String },
}

/// Ordered, token-bounded context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub sections: Vec<ContextSection>,

    /// Sum of section token estimates; never exceeds the requested budget
    pub estimated_tokens: usize,

    /// Candidates that were eligible but did not make it into the bundle
    #[serde(default)]
    pub dropped: usize,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<DegradedSignal>,
}

impl ContextBundle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Sections from one source, in bundle order.
    pub fn from_source(&self, source: SectionSource) -> impl Iterator<Item = &ContextSection> {
        self.sections.iter().filter(move |s| s.source == source)
    }

    /// Concatenate all sections into the text passed to the model.
    pub fn render(&self) -> String {
        self.sections.iter().map(|s| s.text.as_str()).collect()
    }
}
