//! CompletionProvider trait — the opaque LLM text-completion service.
//!
//! Used by branch turns and by the LLM-backed summarizer. Callers must wrap
//! every call in a timeout.

use crate::bundle::ContextBundle;
use crate::error::CompletionError;
use async_trait::async_trait;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// The provider name (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        context: &ContextBundle,
    ) -> Result<String, CompletionError>;
}
