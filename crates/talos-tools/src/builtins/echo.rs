//! Echo tool

use crate::error::Result;
use crate::tool::{Tool, ToolResult};
use talos_llm::ToolDefinition;

/// Echo tool: returns the given text unchanged
pub struct EchoTool {
    definition: ToolDefinition,
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoTool {
    /// Create a new echo tool
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: ToolDefinition::new(
                "echo",
                "Echo the given text back unchanged",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "text": {"type": "string", "description": "Text to echo"}
                    },
                    "required": ["text"]
                }),
            ),
        }
    }
}

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let text = input.get("text").and_then(|v| v.as_str()).unwrap_or("");
        Ok(ToolResult::success(serde_json::json!({ "text": text }), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo() {
        let tool = EchoTool::new();
        let result = tool
            .execute(serde_json::json!({"text": "hello"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["text"], "hello");
    }
}
