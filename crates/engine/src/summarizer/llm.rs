//! LLM-backed summarizer.
//!
//! Sends the branch transcript to a [`CompletionProvider`] and asks for a
//! single JSON object:
//!
//! ```json
//! {"short_summary": "...", "detailed_summary": "...", "topic": "..."}
//! ```
//!
//! Replies wrapped in markdown code fences or surrounded by prose are
//! accepted; anything that still does not parse is reported as
//! [`SummarizationError::Malformed`]. Timeouts are the caller's job.

use async_trait::async_trait;
use serde::Deserialize;
use sidechat_core::bundle::ContextBundle;
use sidechat_core::completion::CompletionProvider;
use sidechat_core::error::{CompletionError, SummarizationError};
use sidechat_core::knowledge::KnowledgeSummary;
use sidechat_core::summarizer::{SummarizationRequest, Summarizer};
use std::sync::Arc;
use tracing::debug;

const INSTRUCTIONS: &str = "\
Summarize the side discussion below so it can be reused as context later.
Reply with one JSON object and nothing else, using exactly these keys:
  \"short_summary\": one sentence,
  \"detailed_summary\": a short paragraph with the concrete conclusions,
  \"topic\": a label of at most four words.";

pub struct LlmSummarizer {
    provider: Arc<dyn CompletionProvider>,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// The prompt sent to the provider for `request`.
    pub fn build_prompt(request: &SummarizationRequest) -> String {
        let mut prompt = String::from(INSTRUCTIONS);
        prompt.push_str("\n\n## Parent message\n");
        prompt.push_str(request.parent_message.trim());
        if !request.selected_text.trim().is_empty() {
            prompt.push_str("\n\n## Selected text\n");
            prompt.push_str(request.selected_text.trim());
        }
        prompt.push_str("\n\n## Side discussion\n");
        for turn in &request.turns {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.content.trim()));
        }
        prompt
    }
}

#[derive(Deserialize)]
struct SummaryReply {
    #[serde(alias = "short")]
    short_summary: String,
    #[serde(default, alias = "detailed")]
    detailed_summary: String,
    #[serde(default)]
    topic: String,
}

/// Parse a provider reply into a summary.
pub fn parse_reply(reply: &str) -> Result<KnowledgeSummary, SummarizationError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| SummarizationError::Malformed("no JSON object in reply".into()))?;
    let parsed: SummaryReply = serde_json::from_str(json)
        .map_err(|e| SummarizationError::Malformed(e.to_string()))?;

    let short_summary = parsed.short_summary.trim().to_string();
    if short_summary.is_empty() {
        return Err(SummarizationError::Malformed("empty short_summary".into()));
    }

    let topic = parsed.topic.trim();
    Ok(KnowledgeSummary {
        detailed_summary: match parsed.detailed_summary.trim() {
            "" => short_summary.clone(),
            detailed => detailed.to_string(),
        },
        topic: if topic.is_empty() {
            "side discussion".to_string()
        } else {
            topic.to_string()
        },
        short_summary,
    })
}

/// The outermost `{...}` span, ignoring code fences and surrounding prose.
fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn summarize(
        &self,
        request: &SummarizationRequest,
    ) -> Result<KnowledgeSummary, SummarizationError> {
        let prompt = Self::build_prompt(request);
        debug!(
            provider = self.provider.name(),
            turns = request.turns.len(),
            "Requesting branch summary"
        );

        let reply = self
            .provider
            .complete(&prompt, &ContextBundle::empty())
            .await
            .map_err(|e| match e {
                CompletionError::Timeout { timeout_ms } => {
                    SummarizationError::Timeout { timeout_ms }
                }
                CompletionError::Failed(reason) => SummarizationError::Failed(reason),
            })?;

        parse_reply(&reply)
    }
}
