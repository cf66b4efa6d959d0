//! Recipes - Multi-stage scripted workflows
//!
//! A recipe is a declarative sequence of stages, each one orchestration-loop
//! invocation over the session's accumulated context. Stages can gate on
//! human approval; sessions checkpoint after every transition and can be
//! resumed from their last checkpoint after interruption or process
//! restart without re-running completed stages.

mod manager;
mod store;
mod types;

pub use manager::RecipeSessionManager;
pub use store::{FileSessionStore, SessionStore};
pub use types::{
    DenyPolicy, PendingApproval, Recipe, RecipeSession, RecipeStage, SessionStatus,
    SessionSummary, StageRecord, StageStatus,
};
