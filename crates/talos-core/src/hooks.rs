//! Hooks - Lifecycle event observation
//!
//! Hook modules observe named lifecycle events emitted by the
//! orchestration loop. Emission is fire-and-forget: a failing hook is
//! logged and never disturbs the turn that emitted the event.

use std::sync::Arc;
use tracing::{debug, warn};

/// Well-known event names emitted by the host
pub mod events {
    /// A loop session begins
    pub const SESSION_START: &str = "session:start";
    /// A loop session finished
    pub const SESSION_END: &str = "session:end";
    /// About to call the provider
    pub const LLM_REQUEST: &str = "llm:request";
    /// Provider responded
    pub const LLM_RESPONSE: &str = "llm:response";
    /// About to execute a tool call
    pub const TOOL_PRE: &str = "tool:pre";
    /// A tool call finished successfully
    pub const TOOL_POST: &str = "tool:post";
    /// A tool call failed
    pub const TOOL_ERROR: &str = "tool:error";
    /// Context is about to be compacted
    pub const CONTEXT_PRE_COMPACT: &str = "context:pre-compact";
}

/// A lifecycle event with a structured payload
#[derive(Debug, Clone)]
pub struct HookEvent {
    /// Event name (see [`events`])
    pub name: String,
    /// Structured payload
    pub payload: serde_json::Value,
}

impl HookEvent {
    /// Create a new event
    #[must_use]
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Trait for hook implementations
#[async_trait::async_trait]
pub trait Hook: Send + Sync {
    /// Get the hook name
    fn name(&self) -> &str;

    /// Handle an event. Errors are logged by the registry and swallowed.
    async fn handle(&self, event: &HookEvent) -> anyhow::Result<()>;
}

/// An ordered collection of hooks sharing one event stream
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    /// Create a registry over the given hooks (caller fixes the order)
    #[must_use]
    pub fn new(hooks: Vec<Arc<dyn Hook>>) -> Self {
        Self { hooks }
    }

    /// Number of registered hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Broadcast an event to every hook, in order
    pub async fn emit(&self, event: HookEvent) {
        for hook in &self.hooks {
            if let Err(e) = hook.handle(&event).await {
                warn!(hook = %hook.name(), event = %event.name, error = %e, "Hook failed");
            }
        }
    }
}

/// Built-in hook that mirrors events into tracing output
pub struct TracingHook {
    name: String,
}

impl TracingHook {
    /// Create a new tracing hook
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait::async_trait]
impl Hook for TracingHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &HookEvent) -> anyhow::Result<()> {
        debug!(event = %event.name, payload = %event.payload, "Lifecycle event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingHook {
        name: String,
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Hook for RecordingHook {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, event: &HookEvent) -> anyhow::Result<()> {
            self.seen
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(format!("{}:{}", self.name, event.name));
            if self.fail {
                anyhow::bail!("hook exploded");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_all_hooks_despite_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let registry = HookRegistry::new(vec![
            Arc::new(RecordingHook {
                name: "a".to_string(),
                seen: seen.clone(),
                fail: true,
            }),
            Arc::new(RecordingHook {
                name: "b".to_string(),
                seen: seen.clone(),
                fail: false,
            }),
        ]);

        registry
            .emit(HookEvent::new(events::SESSION_START, serde_json::json!({})))
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec!["a:session:start".to_string(), "b:session:start".to_string()]
        );
    }
}
