//! Dispatcher - Concurrent tool-call execution
//!
//! Given the tool calls extracted from one provider response, the
//! dispatcher runs them all concurrently against the mounted tool
//! instances and returns one result per call, in input order. Failures are
//! isolated per call: an unknown tool name, a bad argument payload, a
//! raised error, or a per-call timeout each become a failed `ToolResult`
//! and never abort the batch.

use crate::error::{Error, Result};
use crate::tool::{Tool, ToolExecution, ToolResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use talos_llm::ToolCall;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for the tool dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Per-call timeout; `None` disables the bound
    pub call_timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl DispatcherConfig {
    /// Create a configuration with a specific per-call timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            call_timeout: Some(timeout),
        }
    }

    /// Create a configuration with no per-call timeout
    #[must_use]
    pub fn unbounded() -> Self {
        Self { call_timeout: None }
    }
}

/// Concurrent tool-call dispatcher
#[derive(Debug, Clone, Default)]
pub struct ToolDispatcher {
    config: DispatcherConfig,
}

impl ToolDispatcher {
    /// Create a new dispatcher
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Execute all calls concurrently and return results in input order.
    ///
    /// Returns `Error::Cancelled` if the token fires before every call
    /// finishes; outstanding executions are dropped and nothing partial is
    /// reported.
    pub async fn dispatch(
        &self,
        calls: &[ToolCall],
        tools: &HashMap<String, Arc<dyn Tool>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolExecution>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = calls.len(), "Dispatching tool calls");

        let all = futures::future::join_all(calls.iter().map(|call| self.run_call(call, tools)));

        tokio::select! {
            results = all => Ok(results),
            () = cancel.cancelled() => {
                warn!(count = calls.len(), "Tool dispatch cancelled");
                Err(Error::Cancelled)
            }
        }
    }

    /// Run a single call, converting every failure mode into a failed result
    async fn run_call(
        &self,
        call: &ToolCall,
        tools: &HashMap<String, Arc<dyn Tool>>,
    ) -> ToolExecution {
        let started = Instant::now();

        let complete = |result: ToolResult| ToolExecution {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result,
        };

        let Some(tool) = tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Requested tool is not mounted");
            return complete(ToolResult::failure(
                Error::NotFound(call.name.clone()).to_string(),
                elapsed_ms(started),
            ));
        };

        let input: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(value) => value,
            Err(e) => {
                return complete(ToolResult::failure(
                    Error::InvalidInput(format!("arguments are not valid JSON: {e}")).to_string(),
                    elapsed_ms(started),
                ));
            }
        };

        if let Err(e) = tool.validate_input(&input) {
            return complete(ToolResult::failure(e.to_string(), elapsed_ms(started)));
        }

        let execution = tool.execute(input);
        let result = match self.config.call_timeout {
            Some(limit) => match timeout(limit, execution).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => ToolResult::failure(e.to_string(), elapsed_ms(started)),
                Err(_) => {
                    warn!(tool = %call.name, timeout_ms = limit.as_millis() as u64, "Tool call timed out");
                    ToolResult::failure(
                        Error::Timeout {
                            tool: call.name.clone(),
                            timeout_ms: limit.as_millis() as u64,
                        }
                        .to_string(),
                        elapsed_ms(started),
                    )
                }
            },
            None => match execution.await {
                Ok(result) => result,
                Err(e) => ToolResult::failure(e.to_string(), elapsed_ms(started)),
            },
        };

        debug!(
            tool = %call.name,
            call_id = %call.id,
            success = result.success,
            duration_ms = result.duration_ms,
            "Tool call finished"
        );
        complete(result)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use talos_llm::ToolDefinition;

    struct StaticTool {
        definition: ToolDefinition,
        behavior: Behavior,
    }

    enum Behavior {
        Ok,
        Fail,
        Sleep(Duration),
    }

    impl StaticTool {
        fn new(name: &str, behavior: Behavior) -> Arc<dyn Tool> {
            Arc::new(Self {
                definition: ToolDefinition::new(name, "test tool", serde_json::json!({})),
                behavior,
            })
        }
    }

    #[async_trait::async_trait]
    impl Tool for StaticTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
            match &self.behavior {
                Behavior::Ok => Ok(ToolResult::success(input, 1)),
                Behavior::Fail => Err(Error::Execution("deliberate failure".to_string())),
                Behavior::Sleep(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(ToolResult::success(input, duration.as_millis() as u64))
                }
            }
        }
    }

    fn tools(entries: Vec<(&str, Behavior)>) -> HashMap<String, Arc<dyn Tool>> {
        entries
            .into_iter()
            .map(|(name, behavior)| (name.to_string(), StaticTool::new(name, behavior)))
            .collect()
    }

    fn call(name: &str, id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: r#"{"n": 1}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn test_one_failure_does_not_poison_the_batch() {
        let dispatcher = ToolDispatcher::default();
        let tools = tools(vec![
            ("a", Behavior::Ok),
            ("b", Behavior::Fail),
            ("c", Behavior::Ok),
        ]);
        let calls = vec![call("a", "1"), call("b", "2"), call("c", "3")];

        let results = dispatcher
            .dispatch(&calls, &tools, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].call_id, "1");
        assert_eq!(results[1].call_id, "2");
        assert_eq!(results[2].call_id, "3");
        assert!(results[0].result.success);
        assert!(!results[1].result.success);
        assert!(results[2].result.success);
        assert!(results[1]
            .result
            .error
            .as_deref()
            .unwrap()
            .contains("deliberate failure"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_result() {
        let dispatcher = ToolDispatcher::default();
        let tools = tools(vec![("a", Behavior::Ok)]);
        let calls = vec![call("missing", "1"), call("a", "2")];

        let results = dispatcher
            .dispatch(&calls, &tools, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(!results[0].result.success);
        assert!(results[0]
            .result
            .error
            .as_deref()
            .unwrap()
            .contains("not found"));
        assert!(results[1].result.success);
    }

    #[tokio::test]
    async fn test_invalid_arguments_fail_the_call_only() {
        let dispatcher = ToolDispatcher::default();
        let tools = tools(vec![("a", Behavior::Ok)]);
        let calls = vec![ToolCall {
            id: "1".to_string(),
            name: "a".to_string(),
            arguments: "not json".to_string(),
        }];

        let results = dispatcher
            .dispatch(&calls, &tools, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!results[0].result.success);
        assert!(results[0]
            .result
            .error
            .as_deref()
            .unwrap()
            .contains("valid JSON"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_result() {
        let dispatcher = ToolDispatcher::new(DispatcherConfig::with_timeout(
            Duration::from_millis(20),
        ));
        let tools = tools(vec![
            ("slow", Behavior::Sleep(Duration::from_secs(5))),
            ("fast", Behavior::Ok),
        ]);
        let calls = vec![call("slow", "1"), call("fast", "2")];

        let results = dispatcher
            .dispatch(&calls, &tools, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!results[0].result.success);
        assert!(results[0]
            .result
            .error
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert!(results[1].result.success);
    }

    #[tokio::test]
    async fn test_cancellation_returns_no_partial_results() {
        let dispatcher = ToolDispatcher::new(DispatcherConfig::unbounded());
        let tools = tools(vec![("slow", Behavior::Sleep(Duration::from_secs(60)))]);
        let calls = vec![call("slow", "1")];

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let outcome = dispatcher.dispatch(&calls, &tools, &cancel).await;
        assert!(matches!(outcome, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_calls_run_concurrently() {
        let dispatcher = ToolDispatcher::default();
        let tools = tools(vec![
            ("s1", Behavior::Sleep(Duration::from_millis(50))),
            ("s2", Behavior::Sleep(Duration::from_millis(50))),
            ("s3", Behavior::Sleep(Duration::from_millis(50))),
        ]);
        let calls = vec![call("s1", "1"), call("s2", "2"), call("s3", "3")];

        let started = Instant::now();
        let results = dispatcher
            .dispatch(&calls, &tools, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        // Serial execution would take 150ms+
        assert!(started.elapsed() < Duration::from_millis(140));
    }
}
