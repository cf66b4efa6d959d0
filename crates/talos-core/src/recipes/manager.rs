//! Recipe session manager
//!
//! Drives recipe sessions through the orchestration loop one stage at a
//! time, checkpointing after every transition. The session table is shared
//! cross-session state behind an async lock; the host drives any one
//! session sequentially (no two turns of the same session run
//! concurrently), which is the same scheduling contract the loop itself
//! has.

use crate::context::{BufferContext, Context};
use crate::coordinator::ModuleCoordinator;
use crate::error::{Error, Result};
use crate::orchestrator::{LoopOutcome, LoopRequest};
use crate::recipes::store::SessionStore;
use crate::recipes::types::{
    DenyPolicy, PendingApproval, Recipe, RecipeSession, RecipeStage, SessionStatus,
    SessionSummary, StageRecord, StageStatus,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use talos_llm::Message;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Manages recipe sessions: execution, approval gates, checkpoint
/// resumption, and retention cleanup
pub struct RecipeSessionManager {
    coordinator: Arc<ModuleCoordinator>,
    store: Arc<dyn SessionStore>,
    sessions: RwLock<HashMap<Uuid, RecipeSession>>,
}

impl RecipeSessionManager {
    /// Create a manager over a coordinator and a checkpoint store
    #[must_use]
    pub fn new(coordinator: Arc<ModuleCoordinator>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            coordinator,
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Load and structurally validate a recipe document
    pub async fn validate(&self, recipe_path: &Path) -> Result<Recipe> {
        let text = tokio::fs::read_to_string(recipe_path).await.map_err(|e| {
            Error::Recipe(format!("reading '{}': {e}", recipe_path.display()))
        })?;
        let recipe = Recipe::from_yaml(&text)?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Start a new session for a recipe and run it until it completes,
    /// fails, or suspends at an approval gate
    pub async fn execute(
        &self,
        recipe_path: &Path,
        initial_context: Option<String>,
    ) -> Result<SessionSummary> {
        let recipe = self.validate(recipe_path).await?;
        let session = RecipeSession::new(recipe, initial_context);
        info!(
            session_id = %session.id,
            recipe = %session.recipe.name,
            stages = session.recipe.stages.len(),
            "Starting recipe session"
        );
        self.drive(session).await
    }

    /// Approve the pending gate of a suspended session and continue it.
    ///
    /// One `approve` unlocks exactly the named stage; a later gated stage
    /// suspends the session again.
    pub async fn approve(&self, session_id: Uuid, stage: &str) -> Result<SessionSummary> {
        let mut session = self.awaiting_gate(session_id, stage).await?;
        let gate = session.current_stage;
        session.status = SessionStatus::Approved;
        session.approved_stage = Some(gate);
        session.touch();
        self.store.save(&session).await?;
        info!(session_id = %session_id, stage = %stage, "Stage approved");
        self.drive(session).await
    }

    /// Deny the pending gate of a suspended session, applying the recipe's
    /// deny policy (abort or skip)
    pub async fn deny(&self, session_id: Uuid, stage: &str) -> Result<SessionSummary> {
        let mut session = self.awaiting_gate(session_id, stage).await?;
        let gate = session.current_stage;
        session.status = SessionStatus::Denied;
        session.touch();
        self.store.save(&session).await?;

        let denial = Error::ApprovalDenied {
            stage: stage.to_string(),
        };
        match session.recipe.on_deny {
            DenyPolicy::Abort => {
                warn!(session_id = %session_id, stage = %stage, "Stage denied, aborting session");
                session.stages[gate].status = StageStatus::Failed;
                session.stages[gate].error = Some(denial.to_string());
                session.status = SessionStatus::Failed;
                session.touch();
                self.store.save(&session).await?;
                let summary = session.summary();
                self.sessions.write().await.insert(session_id, session);
                Ok(summary)
            }
            DenyPolicy::Skip => {
                warn!(session_id = %session_id, stage = %stage, "Stage denied, skipping");
                session.stages[gate].status = StageStatus::Skipped;
                session.stages[gate].error = Some(denial.to_string());
                session.current_stage += 1;
                session.approved_stage = None;
                self.drive(session).await
            }
        }
    }

    /// Reconstruct a session from its last checkpoint (after interruption
    /// or process restart) and continue it without re-running completed
    /// stages
    pub async fn resume(&self, session_id: Uuid) -> Result<SessionSummary> {
        let stored = self
            .store
            .load(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))?;

        if stored.status.is_terminal() {
            return Err(Error::Recipe(format!(
                "session {session_id} already ended as {:?}",
                stored.status
            )));
        }

        if stored.status == SessionStatus::AwaitingApproval {
            // Still parked at its gate; just bring it back into the table
            let summary = stored.summary();
            self.sessions.write().await.insert(session_id, stored);
            return Ok(summary);
        }

        info!(
            session_id = %session_id,
            stage = stored.current_stage,
            "Resuming session from checkpoint"
        );
        self.drive(stored).await
    }

    /// Mark a session interrupted and checkpoint it for later `resume`
    pub async fn interrupt(&self, session_id: Uuid) -> Result<SessionSummary> {
        let mut session = self.lookup(session_id).await?;
        if session.status.is_terminal() {
            return Err(Error::Recipe(format!(
                "session {session_id} already ended as {:?}",
                session.status
            )));
        }
        session.status = SessionStatus::Interrupted;
        session.approved_stage = None;
        session.touch();
        self.store.save(&session).await?;
        let summary = session.summary();
        self.sessions.write().await.insert(session_id, session);
        Ok(summary)
    }

    /// Read-only snapshot of one session
    pub async fn get(&self, session_id: Uuid) -> Result<RecipeSession> {
        self.lookup(session_id).await
    }

    /// Read-only summaries of all known sessions, most recent first
    pub async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> = self
            .merged_view()
            .await?
            .into_values()
            .map(|session| session.summary())
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// All pending approval gates across sessions
    pub async fn approvals(&self) -> Result<Vec<PendingApproval>> {
        let mut pending: Vec<PendingApproval> = self
            .merged_view()
            .await?
            .into_values()
            .filter(|session| session.status == SessionStatus::AwaitingApproval)
            .filter_map(|session| {
                session.current_stage_def().map(|stage| PendingApproval {
                    session_id: session.id,
                    recipe: session.recipe.name.clone(),
                    stage: stage.name.clone(),
                    stage_index: session.current_stage,
                    requested_at: session.updated_at,
                })
            })
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(pending)
    }

    /// Delete terminal sessions older than the retention window.
    /// Returns how many were removed.
    pub async fn cleanup(&self, retention: chrono::Duration) -> Result<usize> {
        let cutoff = chrono::Utc::now() - retention;
        let mut removed = 0;
        for session in self.store.list().await? {
            if session.status.is_terminal() && session.updated_at < cutoff {
                self.store.delete(session.id).await?;
                self.sessions.write().await.remove(&session.id);
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Cleaned up expired recipe sessions");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Run a session forward until it completes, fails, or suspends, then
    /// publish it to the table
    async fn drive(&self, mut session: RecipeSession) -> Result<SessionSummary> {
        let advanced = self.advance(&mut session).await;
        let summary = session.summary();
        self.sessions.write().await.insert(session.id, session);
        advanced?;
        Ok(summary)
    }

    /// The stage loop: run stages from the cursor until a terminal status
    /// or an approval gate. Stage failures are recorded on the session;
    /// only checkpoint-store failures propagate as errors.
    async fn advance(&self, session: &mut RecipeSession) -> Result<()> {
        session.status = SessionStatus::Running;
        session.touch();

        while session.current_stage < session.recipe.stages.len() {
            let index = session.current_stage;
            let stage = session.recipe.stages[index].clone();

            if stage.requires_approval && session.approved_stage != Some(index) {
                session.status = SessionStatus::AwaitingApproval;
                session.touch();
                self.store.save(session).await?;
                info!(session_id = %session.id, stage = %stage.name, "Awaiting approval");
                return Ok(());
            }

            debug!(session_id = %session.id, stage = %stage.name, "Running stage");
            match self.run_stage(session.messages.clone(), &stage).await {
                Ok((outcome, messages)) => {
                    session.messages = messages;
                    session.stages[index] = StageRecord {
                        name: stage.name.clone(),
                        status: StageStatus::Completed,
                        response: Some(outcome.response),
                        outcome: Some(outcome.status),
                        error: None,
                        turns: outcome.turns,
                    };
                    session.current_stage += 1;
                    session.approved_stage = None;
                    session.status = SessionStatus::Running;
                    session.touch();
                    self.store.save(session).await?;
                }
                Err(Error::Cancelled) => {
                    warn!(session_id = %session.id, stage = %stage.name, "Stage cancelled, session interrupted");
                    session.status = SessionStatus::Interrupted;
                    session.touch();
                    self.store.save(session).await?;
                    return Ok(());
                }
                Err(e) => {
                    error!(session_id = %session.id, stage = %stage.name, error = %e, "Stage failed");
                    session.stages[index].status = StageStatus::Failed;
                    session.stages[index].error = Some(e.to_string());
                    session.status = SessionStatus::Failed;
                    session.touch();
                    self.store.save(session).await?;
                    return Ok(());
                }
            }
        }

        session.status = SessionStatus::Completed;
        session.touch();
        self.store.save(session).await?;
        info!(session_id = %session.id, "Recipe session completed");
        Ok(())
    }

    /// One stage = one loop invocation over the session's context slice
    async fn run_stage(
        &self,
        messages: Vec<Message>,
        stage: &RecipeStage,
    ) -> Result<(LoopOutcome, Vec<Message>)> {
        let orchestrator = self
            .coordinator
            .orchestrator()
            .ok_or_else(|| Error::Recipe("no orchestrator mounted".to_string()))?;

        let context = Arc::new(BufferContext::seeded(messages));
        let modules = self
            .coordinator
            .session_modules_with(context.clone() as Arc<dyn Context>);

        let mut request = LoopRequest::new(&stage.prompt);
        if let Some(provider) = &stage.provider {
            request = request.with_provider(provider);
        }
        if let Some(max_turns) = stage.max_turns {
            request = request.with_max_turns(max_turns);
        }

        let outcome = orchestrator
            .execute(request, &modules, CancellationToken::new())
            .await?;
        let messages = context.messages().await;
        Ok((outcome, messages))
    }

    /// Find a session in the table, falling back to the store
    async fn lookup(&self, session_id: Uuid) -> Result<RecipeSession> {
        if let Some(session) = self.sessions.read().await.get(&session_id) {
            return Ok(session.clone());
        }
        self.store
            .load(session_id)
            .await?
            .ok_or(Error::SessionNotFound(session_id))
    }

    /// Fetch a session that must be suspended at the named gate
    async fn awaiting_gate(&self, session_id: Uuid, stage: &str) -> Result<RecipeSession> {
        let session = self.lookup(session_id).await?;
        if session.status != SessionStatus::AwaitingApproval {
            return Err(Error::Recipe(format!(
                "session {session_id} is not awaiting approval"
            )));
        }
        let gate = session.current_stage_def().ok_or_else(|| {
            Error::Recipe(format!("session {session_id} has no current stage"))
        })?;
        if gate.name != stage {
            return Err(Error::Recipe(format!(
                "approval stage mismatch: gate is '{}', got '{stage}'",
                gate.name
            )));
        }
        Ok(session)
    }

    /// Stored sessions overlaid with the (fresher) in-memory table
    async fn merged_view(&self) -> Result<HashMap<Uuid, RecipeSession>> {
        let mut view: HashMap<Uuid, RecipeSession> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|session| (session.id, session))
            .collect();
        for (id, session) in self.sessions.read().await.iter() {
            view.insert(*id, session.clone());
        }
        Ok(view)
    }
}
