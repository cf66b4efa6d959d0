//! End-to-end host tests: profile resolution → module mounting → the
//! orchestration loop → recipe sessions, wired the way an embedding host
//! would do it.

use std::path::Path;
use std::sync::Arc;
use talos_core::{
    default_catalog, DirProfileSource, FileSessionStore, LoopRequest, LoopStatus,
    ModuleCoordinator, ModuleDescriptor, ModuleFactory, ProfileResolver, RecipeSessionManager,
    SessionStatus, Teardown,
};
use talos_llm::{MockProvider, ProviderResponse, ToolCall};
use tokio_util::sync::CancellationToken;

const MODEL: &str = "mock-model";

/// Factory mounting a shared scripted provider, standing in for a real
/// provider module
struct ScriptedProviderModule {
    provider: Arc<MockProvider>,
}

#[async_trait::async_trait]
impl ModuleFactory for ScriptedProviderModule {
    async fn mount(
        &self,
        coordinator: &ModuleCoordinator,
        descriptor: &ModuleDescriptor,
    ) -> anyhow::Result<Option<Teardown>> {
        coordinator.register_provider(&descriptor.name, self.provider.clone())?;
        Ok(None)
    }
}

fn write_profiles(dir: &Path) {
    std::fs::write(
        dir.join("base.yaml"),
        r#"
name: base
version: "1"
session:
  context: {source: context.buffer}
  orchestrator:
    source: orchestrator.turns
    config:
      max_turns: 8
      retry: {max_attempts: 2, base_delay_ms: 1}
providers:
  - {name: main, source: provider.scripted}
tools:
  - {name: echo, source: tool.echo}
hooks:
  - {name: logging, source: hooks.logging}
"#,
    )
    .unwrap();

    // The leaf profile is a Markdown document with frontmatter; the
    // narrative below the fence is not interpreted
    std::fs::write(
        dir.join("dev.md"),
        r#"---
name: dev
extends: base
tools:
  - {name: file_read, source: tool.file-read}
---

# Dev profile

Adds local file access on top of the base profile.
"#,
    )
    .unwrap();
}

async fn assemble(dir: &Path, provider: Arc<MockProvider>) -> Arc<ModuleCoordinator> {
    let resolver = ProfileResolver::new(Arc::new(DirProfileSource::new(dir)));
    let profile = resolver.resolve("dev").await.unwrap();

    // Inherited sections merged: provider and echo from base, file_read
    // appended by the leaf
    assert_eq!(profile.version.as_deref(), Some("1"));
    assert_eq!(profile.providers.len(), 1);
    let tool_names: Vec<&str> = profile.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tool_names, vec!["echo", "file_read"]);

    let mut catalog = default_catalog();
    catalog.register("provider.scripted", Arc::new(ScriptedProviderModule { provider }));

    let coordinator = Arc::new(ModuleCoordinator::new(catalog));
    coordinator.load_profile(&profile).await.unwrap();
    coordinator
}

#[tokio::test]
async fn test_profile_to_completed_loop_with_tool_call() {
    let dir = tempfile::tempdir().unwrap();
    write_profiles(dir.path());

    let provider = Arc::new(MockProvider::new());
    provider.push_response(ProviderResponse::with_tool_calls(
        "",
        vec![ToolCall::new("echo", &serde_json::json!({"text": "ping"}))],
        MODEL,
    ));
    provider.push_response(ProviderResponse::text("echoed ping", MODEL));

    let coordinator = assemble(dir.path(), provider.clone()).await;
    assert!(coordinator.tool("echo").is_some());
    assert!(coordinator.tool("file_read").is_some());
    assert!(coordinator.context().is_some());
    assert!(coordinator.orchestrator().is_some());

    let outcome = coordinator
        .execute_prompt(LoopRequest::new("run the echo tool"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, LoopStatus::Completed);
    assert_eq!(outcome.response, "echoed ping");
    assert_eq!(outcome.turns, 2);
    assert_eq!(outcome.tool_calls.len(), 1);
    assert!(outcome.tool_calls[0].result.success);
    assert_eq!(provider.call_count(), 2);

    coordinator.shutdown().await;
    assert!(coordinator.tool("echo").is_none());
    assert!(coordinator.orchestrator().is_none());
}

#[tokio::test]
async fn test_recipe_session_over_a_loaded_profile() {
    let dir = tempfile::tempdir().unwrap();
    write_profiles(dir.path());

    let provider = Arc::new(MockProvider::new());
    provider.push_response(ProviderResponse::text("plan ready", MODEL));
    let coordinator = assemble(dir.path(), provider.clone()).await;

    std::fs::write(
        dir.path().join("release.yaml"),
        r#"
name: release
stages:
  - name: plan
    prompt: Draft the release plan.
  - name: ship
    prompt: Execute the release plan.
    requires_approval: true
"#,
    )
    .unwrap();

    let store = Arc::new(FileSessionStore::new(dir.path().join("sessions")).unwrap());
    let manager = RecipeSessionManager::new(coordinator.clone(), store);

    let summary = manager
        .execute(&dir.path().join("release.yaml"), None)
        .await
        .unwrap();
    assert_eq!(summary.status, SessionStatus::AwaitingApproval);

    provider.push_response(ProviderResponse::text("released", MODEL));
    let finished = manager.approve(summary.id, "ship").await.unwrap();
    assert_eq!(finished.status, SessionStatus::Completed);

    let session = manager.get(summary.id).await.unwrap();
    assert_eq!(session.stages[0].response.as_deref(), Some("plan ready"));
    assert_eq!(session.stages[1].response.as_deref(), Some("released"));
}
