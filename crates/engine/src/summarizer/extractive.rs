//! Extractive summarizer — deterministic, built only from the branch text.

use async_trait::async_trait;
use sidechat_core::error::SummarizationError;
use sidechat_core::knowledge::KnowledgeSummary;
use sidechat_core::message::Role;
use sidechat_core::summarizer::{SummarizationRequest, Summarizer};

const TOPIC_WORDS: usize = 4;
const SHORT_SUMMARY_CHARS: usize = 120;
const DEFAULT_TOPIC: &str = "side discussion";

/// Summarizes a branch by quoting it: the selection (or parent message)
/// excerpt plus the first and last turn.
///
/// Identical requests always give identical summaries.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    excerpt_chars: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(200)
    }
}

impl ExtractiveSummarizer {
    pub fn new(excerpt_chars: usize) -> Self {
        Self { excerpt_chars }
    }

    /// Build the summary synchronously. Never fails.
    pub fn extract(&self, request: &SummarizationRequest) -> KnowledgeSummary {
        let anchor = if request.selected_text.trim().is_empty() {
            request.parent_message.trim()
        } else {
            request.selected_text.trim()
        };
        let excerpt = clip(anchor, self.excerpt_chars);

        let first_question = request
            .turns
            .iter()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.trim())
            .unwrap_or_default();

        let short_summary = if first_question.is_empty() {
            format!("Side discussion about \"{}\"", clip(anchor, 60))
        } else {
            clip(first_question, SHORT_SUMMARY_CHARS)
        };

        let mut detailed = String::new();
        if !excerpt.is_empty() {
            detailed.push_str(&format!("Context: {excerpt}\n"));
        }
        if let Some(first) = request.turns.first() {
            detailed.push_str(&format!("First ({}): {}\n", first.role, first.content.trim()));
        }
        if request.turns.len() > 1 {
            if let Some(last) = request.turns.last() {
                detailed.push_str(&format!("Last ({}): {}\n", last.role, last.content.trim()));
            }
        }

        let topic_source = if anchor.is_empty() { first_question } else { anchor };

        KnowledgeSummary {
            short_summary,
            detailed_summary: detailed.trim_end().to_string(),
            topic: topic_from(topic_source),
        }
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(
        &self,
        request: &SummarizationRequest,
    ) -> Result<KnowledgeSummary, SummarizationError> {
        Ok(self.extract(request))
    }
}

/// First `max_chars` characters, with "..." when something was cut.
fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

/// The first few words, lowercased and stripped of punctuation.
fn topic_from(text: &str) -> String {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .take(TOPIC_WORDS)
        .collect();

    if words.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        words.join(" ")
    }
}
