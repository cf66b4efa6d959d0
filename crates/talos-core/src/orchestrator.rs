//! Orchestrator - The turn loop
//!
//! The control-flow core of the host: ask the active provider for a
//! completion, extract requested tool calls, dispatch them concurrently,
//! append the results to context, and repeat until the provider stops
//! calling tools or the turn limit is reached. Provider errors are retried
//! at this boundary according to the configured policy; tool failures stay
//! isolated inside their tool results.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::hooks::{events, HookEvent, HookRegistry};
use crate::utils::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use talos_llm::{CompletionRequest, Message, Provider, ProviderResponse, TokenUsage, ToolDefinition};
use talos_tools::{DispatcherConfig, Tool, ToolDispatcher, ToolExecution};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default turn limit
const DEFAULT_MAX_TURNS: usize = 20;

/// Default wrap-up instruction injected when the turn limit is reached
const DEFAULT_MAX_TURNS_MESSAGE: &str =
    "Maximum turns reached. Produce a final message describing the current state of the task.";

/// One loop invocation: the prompt plus per-run overrides
#[derive(Debug, Clone)]
pub struct LoopRequest {
    /// The user prompt starting this run
    pub prompt: String,
    /// Provider override for this run
    pub provider: Option<String>,
    /// Turn-limit override for this run
    pub max_turns: Option<usize>,
}

impl LoopRequest {
    /// Create a request with no overrides
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            provider: None,
            max_turns: None,
        }
    }

    /// Select a specific provider for this run
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Override the turn limit for this run
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }
}

/// Loop configuration
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum full provider→tools cycles before the loop wraps up
    pub max_turns: usize,
    /// Default provider name; `None` selects the first mounted provider
    pub provider: Option<String>,
    /// Wrap-up instruction for the final tool-free call at the turn limit
    pub max_turns_message: String,
    /// Retry policy applied at the provider-call boundary, including the
    /// per-call timeout
    pub retry: RetryPolicy,
    /// Tool-dispatch configuration (per-call timeout)
    pub dispatcher: DispatcherConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            provider: None,
            max_turns_message: DEFAULT_MAX_TURNS_MESSAGE.to_string(),
            retry: RetryPolicy::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl LoopConfig {
    /// Create a default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the turn limit
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Set the default provider name
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set the provider-call timeout
    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.retry.call_timeout = timeout;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the tool-dispatch configuration
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }
}

/// How a loop run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopStatus {
    /// The provider produced a final answer
    Completed,
    /// The turn limit was reached; the response is the wrap-up message
    RecursionLimitExceeded,
}

/// Result of one loop run
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Terminal status
    pub status: LoopStatus,
    /// Final response text
    pub response: String,
    /// Completed provider→tools cycles
    pub turns: usize,
    /// Every tool execution performed during the run, in order
    pub tool_calls: Vec<ToolExecution>,
    /// Aggregated token usage
    pub usage: TokenUsage,
}

/// The module instances one loop run operates over: a context manager plus
/// snapshots of the provider/tool/hook mount points
#[derive(Clone)]
pub struct SessionModules {
    /// Conversation state (the loop is the only mutator)
    pub context: Arc<dyn Context>,
    /// Providers by mount name
    pub providers: HashMap<String, Arc<dyn Provider>>,
    /// Tools by mount name
    pub tools: HashMap<String, Arc<dyn Tool>>,
    /// Hooks, in emission order
    pub hooks: HookRegistry,
}

/// Trait for orchestrator implementations (mountable on the
/// `orchestrator` point)
#[async_trait::async_trait]
pub trait Orchestrator: Send + Sync {
    /// Run one loop session to a terminal outcome
    async fn execute(
        &self,
        request: LoopRequest,
        modules: &SessionModules,
        cancel: CancellationToken,
    ) -> Result<LoopOutcome>;
}

/// Default orchestrator: the sequential turn loop
pub struct TurnOrchestrator {
    config: LoopConfig,
    dispatcher: ToolDispatcher,
}

impl Default for TurnOrchestrator {
    fn default() -> Self {
        Self::new(LoopConfig::default())
    }
}

impl TurnOrchestrator {
    /// Create an orchestrator with the given configuration
    #[must_use]
    pub fn new(config: LoopConfig) -> Self {
        let dispatcher = ToolDispatcher::new(config.dispatcher.clone());
        Self { config, dispatcher }
    }

    /// Pick the provider for a run: the named one if configured, the
    /// lexicographically first mounted one otherwise
    fn select_provider(
        &self,
        request: &LoopRequest,
        modules: &SessionModules,
    ) -> Result<Arc<dyn Provider>> {
        let configured = request
            .provider
            .as_deref()
            .or(self.config.provider.as_deref());
        match configured {
            Some(name) => modules
                .providers
                .get(name)
                .cloned()
                .ok_or_else(|| Error::ProviderUnavailable(format!("'{name}' is not mounted"))),
            None => {
                let mut names: Vec<&String> = modules.providers.keys().collect();
                names.sort();
                let first = names
                    .first()
                    .ok_or_else(|| Error::ProviderUnavailable("no providers are mounted".to_string()))?;
                Ok(modules.providers[*first].clone())
            }
        }
    }

    /// Call the provider with timeout, retry policy, and cancellation
    async fn complete_with_retry(
        &self,
        provider: &Arc<dyn Provider>,
        request: CompletionRequest,
        hooks: &HookRegistry,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse> {
        hooks
            .emit(HookEvent::new(
                events::LLM_REQUEST,
                serde_json::json!({
                    "provider": provider.name(),
                    "messages": request.messages.len(),
                    "tools": request.tools.len(),
                }),
            ))
            .await;

        let operation = || {
            let provider = provider.clone();
            let request = request.clone();
            async move { provider.complete(request).await }
        };

        let attempt = tokio::select! {
            result = self.config.retry.completion(operation) => result,
            () = cancel.cancelled() => return Err(Error::Cancelled),
        };

        match attempt {
            Ok(response) => {
                hooks
                    .emit(HookEvent::new(
                        events::LLM_RESPONSE,
                        serde_json::json!({
                            "provider": provider.name(),
                            "tool_calls": response.tool_calls.len(),
                            "finish_reason": response.finish_reason,
                        }),
                    ))
                    .await;
                Ok(response)
            }
            Err(exhausted) => {
                warn!(
                    provider = %provider.name(),
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Provider retries exhausted"
                );
                Err(Error::Llm(exhausted.last_error))
            }
        }
    }

    /// Tool definitions advertised to the provider, in stable order
    fn tool_specs(modules: &SessionModules) -> Vec<ToolDefinition> {
        let mut specs: Vec<ToolDefinition> = modules
            .tools
            .values()
            .map(|tool| tool.definition().clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

#[async_trait::async_trait]
impl Orchestrator for TurnOrchestrator {
    async fn execute(
        &self,
        request: LoopRequest,
        modules: &SessionModules,
        cancel: CancellationToken,
    ) -> Result<LoopOutcome> {
        let provider = self.select_provider(&request, modules)?;
        let max_turns = request.max_turns.unwrap_or(self.config.max_turns);
        let tool_specs = Self::tool_specs(modules);

        modules
            .hooks
            .emit(HookEvent::new(
                events::SESSION_START,
                serde_json::json!({ "provider": provider.name(), "max_turns": max_turns }),
            ))
            .await;

        modules.context.append(Message::user(&request.prompt)).await;

        let mut turns = 0;
        let mut usage = TokenUsage::default();
        let mut records: Vec<ToolExecution> = Vec::new();

        loop {
            if turns >= max_turns {
                // Limit reached: one final tool-free call so the model can
                // report the state things are being left in.
                warn!(max_turns, "Turn limit reached, wrapping up");
                modules
                    .context
                    .append(Message::user(&self.config.max_turns_message))
                    .await;

                let messages = modules.context.messages().await;
                let response = self
                    .complete_with_retry(
                        &provider,
                        CompletionRequest::new(messages),
                        &modules.hooks,
                        &cancel,
                    )
                    .await?;
                if let Some(u) = &response.usage {
                    usage.accumulate(u);
                }
                modules
                    .context
                    .append(Message::assistant(&response.content))
                    .await;
                modules
                    .hooks
                    .emit(HookEvent::new(
                        events::SESSION_END,
                        serde_json::json!({ "status": "recursion-limit-exceeded", "turns": turns }),
                    ))
                    .await;

                return Ok(LoopOutcome {
                    status: LoopStatus::RecursionLimitExceeded,
                    response: response.content,
                    turns,
                    tool_calls: records,
                    usage,
                });
            }
            turns += 1;

            if modules.context.should_compact().await {
                modules
                    .hooks
                    .emit(HookEvent::new(
                        events::CONTEXT_PRE_COMPACT,
                        serde_json::json!({}),
                    ))
                    .await;
                modules.context.compact().await;
            }

            let messages = modules.context.messages().await;
            let completion =
                CompletionRequest::new(messages).with_tools(tool_specs.clone());
            let response = self
                .complete_with_retry(&provider, completion, &modules.hooks, &cancel)
                .await?;
            if let Some(u) = &response.usage {
                usage.accumulate(u);
            }

            let calls = provider.parse_tool_calls(&response);
            if calls.is_empty() {
                modules
                    .context
                    .append(Message::assistant(&response.content))
                    .await;
                modules
                    .hooks
                    .emit(HookEvent::new(
                        events::SESSION_END,
                        serde_json::json!({ "status": "completed", "turns": turns }),
                    ))
                    .await;
                info!(turns, "Loop completed");
                return Ok(LoopOutcome {
                    status: LoopStatus::Completed,
                    response: response.content,
                    turns,
                    tool_calls: records,
                    usage,
                });
            }

            debug!(turn = turns, calls = calls.len(), "Provider requested tools");
            modules
                .context
                .append(Message::assistant_with_calls(
                    &response.content,
                    calls.clone(),
                ))
                .await;

            for call in &calls {
                modules
                    .hooks
                    .emit(HookEvent::new(
                        events::TOOL_PRE,
                        serde_json::json!({
                            "tool_name": call.name,
                            "call_id": call.id,
                        }),
                    ))
                    .await;
            }

            let executions = self
                .dispatcher
                .dispatch(&calls, &modules.tools, &cancel)
                .await
                .map_err(|e| match e {
                    talos_tools::Error::Cancelled => Error::Cancelled,
                    other => Error::Tool(other),
                })?;

            for execution in &executions {
                let event = if execution.result.success {
                    HookEvent::new(
                        events::TOOL_POST,
                        serde_json::json!({
                            "tool_name": execution.tool_name,
                            "call_id": execution.call_id,
                            "duration_ms": execution.result.duration_ms,
                        }),
                    )
                } else {
                    HookEvent::new(
                        events::TOOL_ERROR,
                        serde_json::json!({
                            "tool_name": execution.tool_name,
                            "call_id": execution.call_id,
                            "error": execution.result.error,
                        }),
                    )
                };
                modules.hooks.emit(event).await;

                modules
                    .context
                    .append(
                        Message::tool_response(&execution.call_id, execution.content())
                            .with_name(&execution.tool_name),
                    )
                    .await;
            }
            records.extend(executions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BufferContext;
    use std::time::Duration;
    use talos_llm::{MockProvider, ToolCall};
    use talos_tools::builtins::EchoTool;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    fn modules_with(provider: Arc<MockProvider>) -> SessionModules {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        providers.insert("mock".to_string(), provider);
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        tools.insert("echo".to_string(), Arc::new(EchoTool::new()));
        SessionModules {
            context: Arc::new(BufferContext::new()),
            providers,
            tools,
            hooks: HookRegistry::default(),
        }
    }

    fn echo_call(text: &str) -> ToolCall {
        ToolCall::new("echo", &serde_json::json!({ "text": text }))
    }

    #[tokio::test]
    async fn test_completes_without_tools_in_one_turn() {
        let provider = Arc::new(MockProvider::new());
        provider.push_response(ProviderResponse::text("all done", "mock-model"));
        let modules = modules_with(provider.clone());

        let orchestrator = TurnOrchestrator::default();
        let outcome = orchestrator
            .execute(
                LoopRequest::new("do the thing"),
                &modules,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, LoopStatus::Completed);
        assert_eq!(outcome.response, "all done");
        assert_eq!(outcome.turns, 1);
        assert!(outcome.tool_calls.is_empty());

        let messages = modules.context.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "do the thing");
        assert_eq!(messages[1].content, "all done");
    }

    #[tokio::test]
    async fn test_tool_cycle_appends_results_then_completes() {
        let provider = Arc::new(MockProvider::new());
        let call = echo_call("ping");
        let call_id = call.id.clone();
        provider.push_response(ProviderResponse::with_tool_calls(
            "",
            vec![call],
            "mock-model",
        ));
        provider.push_response(ProviderResponse::text("echoed", "mock-model"));
        let modules = modules_with(provider.clone());

        let orchestrator = TurnOrchestrator::default();
        let outcome = orchestrator
            .execute(LoopRequest::new("say ping"), &modules, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, LoopStatus::Completed);
        assert_eq!(outcome.turns, 2);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(outcome.tool_calls[0].result.success);

        // user, assistant(tool calls), tool result, assistant
        let messages = modules.context.messages().await;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].tool_calls.len(), 1);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some(call_id.as_str()));
        assert!(messages[2].content.contains("ping"));
    }

    #[tokio::test]
    async fn test_turn_limit_wraps_up_without_a_third_call() {
        let provider = Arc::new(MockProvider::new());
        // Every scripted turn asks for a tool; limit must cut this off
        provider.push_response(ProviderResponse::with_tool_calls(
            "",
            vec![echo_call("one")],
            "mock-model",
        ));
        provider.push_response(ProviderResponse::text("leaving things tidy", "mock-model"));
        provider.push_response(ProviderResponse::with_tool_calls(
            "",
            vec![echo_call("never")],
            "mock-model",
        ));
        let modules = modules_with(provider.clone());

        let orchestrator = TurnOrchestrator::new(LoopConfig::new().with_max_turns(1));
        let outcome = orchestrator
            .execute(LoopRequest::new("loop forever"), &modules, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, LoopStatus::RecursionLimitExceeded);
        assert_eq!(outcome.response, "leaving things tidy");
        assert_eq!(outcome.turns, 1);
        // One looping call plus one wrap-up call, never a third
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_provider_errors_are_retried_per_policy() {
        let provider = Arc::new(MockProvider::new());
        provider.push_error(talos_llm::Error::RateLimit);
        provider.push_error(talos_llm::Error::Network("reset".to_string()));
        provider.push_response(ProviderResponse::text("third time lucky", "mock-model"));
        let modules = modules_with(provider.clone());

        let orchestrator =
            TurnOrchestrator::new(LoopConfig::new().with_retry(fast_retry(3)));
        let outcome = orchestrator
            .execute(LoopRequest::new("hi"), &modules, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.response, "third time lucky");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_run() {
        let provider = Arc::new(MockProvider::new());
        for _ in 0..3 {
            provider.push_error(talos_llm::Error::RateLimit);
        }
        let modules = modules_with(provider.clone());

        let orchestrator =
            TurnOrchestrator::new(LoopConfig::new().with_retry(fast_retry(3)));
        let err = orchestrator
            .execute(LoopRequest::new("hi"), &modules, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Llm(talos_llm::Error::RateLimit)));
        assert_eq!(provider.call_count(), 3);
        // Context holds only the committed user message
        assert_eq!(modules.context.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_provider_error_fails_fast() {
        let provider = Arc::new(MockProvider::new());
        provider.push_error(talos_llm::Error::InvalidResponse("garbled".to_string()));
        let modules = modules_with(provider.clone());

        let orchestrator =
            TurnOrchestrator::new(LoopConfig::new().with_retry(fast_retry(5)));
        let err = orchestrator
            .execute(LoopRequest::new("hi"), &modules, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Llm(talos_llm::Error::InvalidResponse(_))));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_tool_keeps_the_batch_and_the_loop() {
        let provider = Arc::new(MockProvider::new());
        provider.push_response(ProviderResponse::with_tool_calls(
            "",
            vec![
                echo_call("a"),
                ToolCall::new("missing_tool", &serde_json::json!({})),
                echo_call("c"),
            ],
            "mock-model",
        ));
        provider.push_response(ProviderResponse::text("done", "mock-model"));
        let modules = modules_with(provider.clone());

        let orchestrator = TurnOrchestrator::default();
        let outcome = orchestrator
            .execute(LoopRequest::new("go"), &modules, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, LoopStatus::Completed);
        assert_eq!(outcome.tool_calls.len(), 3);
        assert!(outcome.tool_calls[0].result.success);
        assert!(!outcome.tool_calls[1].result.success);
        assert!(outcome.tool_calls[2].result.success);

        // Three tool messages landed in context, in call order
        let messages = modules.context.messages().await;
        let tool_messages: Vec<&Message> = messages
            .iter()
            .filter(|m| m.role == talos_llm::MessageRole::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 3);
        assert!(tool_messages[1].content.contains("not found"));
    }

    #[tokio::test]
    async fn test_no_provider_is_an_error() {
        let modules = SessionModules {
            context: Arc::new(BufferContext::new()),
            providers: HashMap::new(),
            tools: HashMap::new(),
            hooks: HookRegistry::default(),
        };

        let orchestrator = TurnOrchestrator::default();
        let err = orchestrator
            .execute(LoopRequest::new("hi"), &modules, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_named_provider_selection() {
        let chatty = Arc::new(MockProvider::new());
        chatty.push_response(ProviderResponse::text("from b", "mock-model"));

        let mut modules = modules_with(Arc::new(MockProvider::new()));
        modules.providers.insert("b".to_string(), chatty);

        let orchestrator = TurnOrchestrator::default();
        let outcome = orchestrator
            .execute(
                LoopRequest::new("hi").with_provider("b"),
                &modules,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.response, "from b");

        let err = orchestrator
            .execute(
                LoopRequest::new("hi").with_provider("ghost"),
                &modules,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable(_)));
    }
}
