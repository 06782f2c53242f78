//! Summarizer implementations used on merge.
//!
//! - [`LlmSummarizer`] asks a completion provider for a JSON summary.
//! - [`ExtractiveSummarizer`] builds one from the branch itself; it never
//!   fails and doubles as the engine's fallback.

pub mod extractive;
pub mod llm;

pub use extractive::ExtractiveSummarizer;
pub use llm::LlmSummarizer;

use sidechat_config::SummarizerConfig;
use sidechat_core::completion::CompletionProvider;
use sidechat_core::error::{Error, Result};
use sidechat_core::summarizer::Summarizer;
use std::sync::Arc;

/// Create the summarizer selected by `config.mode`.
///
/// `"llm"` needs a completion provider; `"extractive"` ignores it.
pub fn build_summarizer(
    config: &SummarizerConfig,
    provider: Option<Arc<dyn CompletionProvider>>,
) -> Result<Arc<dyn Summarizer>> {
    match config.mode.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveSummarizer::new(config.excerpt_chars))),
        "llm" => match provider {
            Some(provider) => Ok(Arc::new(LlmSummarizer::new(provider))),
            None => Err(Error::Config {
                message: "summarizer.mode = \"llm\" requires a completion provider".into(),
            }),
        },
        other => Err(Error::Config {
            message: format!("Unknown summarizer mode: {other}"),
        }),
    }
}
