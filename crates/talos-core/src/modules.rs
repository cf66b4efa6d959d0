//! Modules - Built-in module entry points
//!
//! Factories bridging the built-in implementations onto the coordinator's
//! mount points, plus [`default_catalog`] registering them all under their
//! source locators. Provider modules mount under the descriptor's name so
//! profiles can alias them; tool modules mount under the tool's own
//! definition name, which is the name providers call them by.

use crate::context::BufferContext;
use crate::coordinator::{ModuleCatalog, ModuleCoordinator, ModuleFactory, Teardown};
use crate::hooks::TracingHook;
use crate::orchestrator::{LoopConfig, TurnOrchestrator};
use crate::profile::ModuleDescriptor;
use crate::utils::retry::RetryPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use talos_llm::{OpenAiConfig, OpenAiProvider};
use talos_tools::builtins::{EchoTool, FileReadTool, HttpGetTool};
use talos_tools::{DispatcherConfig, Tool};
use tracing::info;

/// Deserialize a descriptor's config mapping into a typed struct
fn typed_config<T: serde::de::DeserializeOwned + Default>(
    descriptor: &ModuleDescriptor,
) -> anyhow::Result<T> {
    if descriptor.config.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_value(serde_json::Value::Object(descriptor.config.clone()))
        .map_err(|e| anyhow::anyhow!("invalid config for module '{}': {e}", descriptor.name))
}

// ============================================================================
// Provider modules
// ============================================================================

/// Mounts an OpenAI-compatible provider (`provider.openai`)
pub struct OpenAiProviderModule;

#[derive(Debug, Default, Deserialize)]
struct OpenAiModuleConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[async_trait::async_trait]
impl ModuleFactory for OpenAiProviderModule {
    async fn mount(
        &self,
        coordinator: &ModuleCoordinator,
        descriptor: &ModuleDescriptor,
    ) -> anyhow::Result<Option<Teardown>> {
        let config: OpenAiModuleConfig = typed_config(descriptor)?;

        // Credentials come from module config or the environment, never
        // from profile narrative
        let api_key = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                anyhow::anyhow!("no OpenAI API key (config 'api_key' or OPENAI_API_KEY)")
            })?;

        let mut provider_config = OpenAiConfig::new(api_key);
        if let Some(base_url) = config.base_url {
            provider_config = provider_config.with_base_url(base_url);
        }
        if let Some(model) = config.model {
            provider_config = provider_config.with_model(model);
        }
        if let Some(max_tokens) = config.max_tokens {
            provider_config = provider_config.with_max_tokens(max_tokens);
        }
        if let Some(secs) = config.timeout_secs {
            provider_config = provider_config.with_timeout(Duration::from_secs(secs));
        }

        let provider = Arc::new(OpenAiProvider::new(provider_config)?);
        coordinator.register_provider(&descriptor.name, provider)?;
        info!(name = %descriptor.name, "Mounted OpenAI provider");
        Ok(None)
    }
}

// ============================================================================
// Context module
// ============================================================================

/// Mounts an in-memory buffer context (`context.buffer`)
pub struct BufferContextModule;

#[derive(Debug, Default, Deserialize)]
struct BufferContextConfig {
    compact_threshold: Option<usize>,
    keep_recent: Option<usize>,
}

#[async_trait::async_trait]
impl ModuleFactory for BufferContextModule {
    async fn mount(
        &self,
        coordinator: &ModuleCoordinator,
        descriptor: &ModuleDescriptor,
    ) -> anyhow::Result<Option<Teardown>> {
        let config: BufferContextConfig = typed_config(descriptor)?;
        let context = match config.compact_threshold {
            Some(threshold) => Arc::new(BufferContext::with_compaction(
                threshold,
                config.keep_recent.unwrap_or(8),
            )),
            None => Arc::new(BufferContext::new()),
        };
        coordinator.register_context(&descriptor.name, context)?;
        Ok(None)
    }
}

// ============================================================================
// Orchestrator module
// ============================================================================

/// Mounts the default turn-loop orchestrator (`orchestrator.turns`)
pub struct TurnLoopModule;

#[derive(Debug, Default, Deserialize)]
struct RetryModuleConfig {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TurnLoopConfig {
    max_turns: Option<usize>,
    provider: Option<String>,
    provider_timeout_ms: Option<u64>,
    tool_timeout_ms: Option<u64>,
    max_turns_message: Option<String>,
    #[serde(default)]
    retry: RetryModuleConfig,
}

#[async_trait::async_trait]
impl ModuleFactory for TurnLoopModule {
    async fn mount(
        &self,
        coordinator: &ModuleCoordinator,
        descriptor: &ModuleDescriptor,
    ) -> anyhow::Result<Option<Teardown>> {
        let config: TurnLoopConfig = typed_config(descriptor)?;

        let mut loop_config = LoopConfig::new();
        if let Some(max_turns) = config.max_turns {
            loop_config = loop_config.with_max_turns(max_turns);
        }
        if let Some(provider) = config.provider {
            loop_config = loop_config.with_provider(provider);
        }
        if let Some(ms) = config.provider_timeout_ms {
            loop_config = loop_config.with_provider_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = config.tool_timeout_ms {
            loop_config =
                loop_config.with_dispatcher(DispatcherConfig::with_timeout(Duration::from_millis(ms)));
        }
        if let Some(message) = config.max_turns_message {
            loop_config.max_turns_message = message;
        }

        let mut retry = loop_config.retry.clone();
        if let Some(attempts) = config.retry.max_attempts {
            retry = retry.with_max_attempts(attempts);
        }
        if let Some(ms) = config.retry.base_delay_ms {
            retry = retry.with_base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = config.retry.max_delay_ms {
            retry = retry.with_max_delay(Duration::from_millis(ms));
        }
        loop_config = loop_config.with_retry(retry);

        coordinator
            .register_orchestrator(&descriptor.name, Arc::new(TurnOrchestrator::new(loop_config)))?;
        Ok(None)
    }
}

// ============================================================================
// Hook module
// ============================================================================

/// Mounts the tracing hook (`hooks.logging`)
pub struct LoggingHookModule;

#[async_trait::async_trait]
impl ModuleFactory for LoggingHookModule {
    async fn mount(
        &self,
        coordinator: &ModuleCoordinator,
        descriptor: &ModuleDescriptor,
    ) -> anyhow::Result<Option<Teardown>> {
        coordinator.register_hook(
            &descriptor.name,
            Arc::new(TracingHook::new(descriptor.name.clone())),
        )?;
        Ok(None)
    }
}

// ============================================================================
// Tool modules
// ============================================================================

/// Register a tool under its own definition name
fn mount_tool(coordinator: &ModuleCoordinator, tool: Arc<dyn Tool>) -> anyhow::Result<()> {
    let name = tool.name().to_string();
    coordinator.register_tool(&name, tool)?;
    Ok(())
}

/// Mounts the echo tool (`tool.echo`)
pub struct EchoToolModule;

#[async_trait::async_trait]
impl ModuleFactory for EchoToolModule {
    async fn mount(
        &self,
        coordinator: &ModuleCoordinator,
        _descriptor: &ModuleDescriptor,
    ) -> anyhow::Result<Option<Teardown>> {
        mount_tool(coordinator, Arc::new(EchoTool::new()))?;
        Ok(None)
    }
}

/// Mounts the file-read tool (`tool.file-read`)
pub struct FileReadToolModule;

#[derive(Debug, Default, Deserialize)]
struct FileReadToolConfig {
    root: Option<PathBuf>,
    max_bytes: Option<usize>,
}

#[async_trait::async_trait]
impl ModuleFactory for FileReadToolModule {
    async fn mount(
        &self,
        coordinator: &ModuleCoordinator,
        descriptor: &ModuleDescriptor,
    ) -> anyhow::Result<Option<Teardown>> {
        let config: FileReadToolConfig = typed_config(descriptor)?;
        let mut tool = FileReadTool::new(config.root);
        if let Some(max_bytes) = config.max_bytes {
            tool = tool.with_max_bytes(max_bytes);
        }
        mount_tool(coordinator, Arc::new(tool))?;
        Ok(None)
    }
}

/// Mounts the HTTP GET tool (`tool.http-get`)
pub struct HttpGetToolModule;

#[async_trait::async_trait]
impl ModuleFactory for HttpGetToolModule {
    async fn mount(
        &self,
        coordinator: &ModuleCoordinator,
        _descriptor: &ModuleDescriptor,
    ) -> anyhow::Result<Option<Teardown>> {
        mount_tool(coordinator, Arc::new(HttpGetTool::new()))?;
        Ok(None)
    }
}

/// The catalog of built-in modules under their source locators
#[must_use]
pub fn default_catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    catalog.register("provider.openai", Arc::new(OpenAiProviderModule));
    catalog.register("context.buffer", Arc::new(BufferContextModule));
    catalog.register("orchestrator.turns", Arc::new(TurnLoopModule));
    catalog.register("hooks.logging", Arc::new(LoggingHookModule));
    catalog.register("tool.echo", Arc::new(EchoToolModule));
    catalog.register("tool.file-read", Arc::new(FileReadToolModule));
    catalog.register("tool.http-get", Arc::new(HttpGetToolModule));
    catalog
}
