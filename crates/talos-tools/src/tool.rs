//! Tool contract
//!
//! The capability trait implemented by every tool module, and the result
//! types the dispatcher hands back to the orchestration loop.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use talos_llm::ToolDefinition;

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether execution succeeded
    pub success: bool,
    /// Output data
    pub output: serde_json::Value,
    /// Error message if failed
    pub error: Option<String>,
    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl ToolResult {
    /// Create a successful result
    #[must_use]
    pub fn success(output: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration_ms,
        }
    }

    /// Create a failed result
    #[must_use]
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// A tool result paired with the call it answers.
///
/// The dispatcher returns one of these per requested call, in input order,
/// so the loop can append matching tool messages to context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    /// ID of the tool call this result answers
    pub call_id: String,
    /// Tool name
    pub tool_name: String,
    /// The execution result
    pub result: ToolResult,
}

impl ToolExecution {
    /// Render the result as tool-message content for the conversation
    #[must_use]
    pub fn content(&self) -> String {
        if self.result.success {
            self.result.output.to_string()
        } else {
            format!(
                "Error: {}",
                self.result.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Trait for tool implementations
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition
    fn definition(&self) -> &ToolDefinition;

    /// Get the tool name
    fn name(&self) -> &str {
        &self.definition().name
    }

    /// Execute the tool with given input
    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult>;

    /// Validate input before execution
    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        if !input.is_object() {
            return Err(Error::InvalidInput("input must be an object".to_string()));
        }
        Ok(())
    }
}
