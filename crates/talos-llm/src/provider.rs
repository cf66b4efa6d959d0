//! Provider trait
//!
//! The capability contract every language-model provider module implements.
//! Providers only ever see context snapshots; they never mutate host state.

use crate::completion::{CompletionRequest, ProviderResponse};
use crate::error::Result;
use crate::tools::ToolCall;

/// Trait for language-model providers
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Check if the provider supports function calling/tools
    fn supports_tools(&self) -> bool {
        true
    }

    /// Complete a conversation
    async fn complete(&self, request: CompletionRequest) -> Result<ProviderResponse>;

    /// Extract the ordered tool calls from a response.
    ///
    /// The default reads the structured calls the provider embedded in the
    /// response; providers whose models emit calls inline in text can
    /// override this to parse them out.
    fn parse_tool_calls(&self, response: &ProviderResponse) -> Vec<ToolCall> {
        response.tool_calls.clone()
    }
}
