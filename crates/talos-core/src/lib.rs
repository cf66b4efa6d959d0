//! Talos Core - Host Runtime
//!
//! This crate provides the coordination core of the Talos host:
//! - Profile: layered configuration resolution with inheritance
//! - Coordinator: module mounting with lifecycle guarantees
//! - Context: conversation state ownership
//! - Hooks: fire-and-forget lifecycle event observation
//! - Orchestrator: the provider→tools turn loop
//! - Recipes: checkpointed, human-approved multi-stage workflows
//! - Utils: retry with exponential backoff

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod coordinator;
pub mod error;
pub mod hooks;
pub mod modules;
pub mod orchestrator;
pub mod profile;
pub mod recipes;
pub mod utils;

pub use context::{BufferContext, Context};
pub use coordinator::{
    points, ModuleCatalog, ModuleCoordinator, ModuleFactory, MountPoint, Teardown,
};
pub use error::{Error, Result};
pub use hooks::{events, Hook, HookEvent, HookRegistry, TracingHook};
pub use modules::default_catalog;
pub use orchestrator::{
    LoopConfig, LoopOutcome, LoopRequest, LoopStatus, Orchestrator, SessionModules,
    TurnOrchestrator,
};
pub use profile::{
    DirProfileSource, ModuleDescriptor, ProfileResolver, ProfileSource, ResolvedProfile,
    SessionSection,
};
pub use recipes::{
    DenyPolicy, FileSessionStore, PendingApproval, Recipe, RecipeSession, RecipeSessionManager,
    RecipeStage, SessionStatus, SessionStore, SessionSummary, StageRecord, StageStatus,
};
pub use utils::retry::{RetryExhausted, RetryPolicy};
