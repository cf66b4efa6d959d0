//! Recipe and session data model

use crate::error::{Error, Result};
use crate::orchestrator::LoopStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use talos_llm::Message;
use uuid::Uuid;

/// What `deny` at an approval gate does to the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenyPolicy {
    /// The session fails at the denied stage (fail-safe default)
    #[default]
    Abort,
    /// The denied stage is skipped and the session continues
    Skip,
}

/// One stage of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStage {
    /// Stage name, unique within the recipe
    pub name: String,
    /// Prompt driving this stage's loop invocation
    pub prompt: String,
    /// Whether a human must approve before this stage runs
    #[serde(default)]
    pub requires_approval: bool,
    /// Provider override for this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Turn-limit override for this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,
}

/// A declarative multi-stage workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe name
    pub name: String,
    /// Recipe version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Deny policy at approval gates
    #[serde(default)]
    pub on_deny: DenyPolicy,
    /// Ordered stages
    pub stages: Vec<RecipeStage>,
}

impl Recipe {
    /// Parse a recipe from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Recipe(format!("invalid recipe: {e}")))
    }

    /// Check structural validity: at least one stage, unique stage names,
    /// non-empty prompts
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::Recipe(format!(
                "recipe '{}' has no stages",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.is_empty() {
                return Err(Error::Recipe(format!(
                    "recipe '{}' has a stage with no name",
                    self.name
                )));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(Error::Recipe(format!(
                    "recipe '{}' has duplicate stage '{}'",
                    self.name, stage.name
                )));
            }
            if stage.prompt.trim().is_empty() {
                return Err(Error::Recipe(format!(
                    "stage '{}' has an empty prompt",
                    stage.name
                )));
            }
        }
        Ok(())
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    /// Stages are executing
    Running,
    /// Suspended at an approval gate
    AwaitingApproval,
    /// Gate approved; the gated stage is about to run
    Approved,
    /// Gate denied; the deny policy is being applied
    Denied,
    /// Suspended mid-run (cancellation, process exit)
    Interrupted,
    /// All stages finished
    Completed,
    /// A stage failed, retries were exhausted, or a denial aborted the run
    Failed,
}

impl SessionStatus {
    /// Whether the session can never advance again
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-stage outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Not reached yet
    Pending,
    /// Ran to a terminal loop outcome
    Completed,
    /// Skipped by a deny under the skip policy
    Skipped,
    /// Failed (loop error or aborting denial)
    Failed,
}

/// Record of one stage's execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name
    pub name: String,
    /// Outcome status
    pub status: StageStatus,
    /// Final response text, when the stage ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// How the stage's loop ended, when it ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<LoopStatus>,
    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provider turns the stage consumed
    #[serde(default)]
    pub turns: usize,
}

impl StageRecord {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Pending,
            response: None,
            outcome: None,
            error: None,
            turns: 0,
        }
    }
}

/// A recipe run with its durable checkpoint state.
///
/// The serialized form of this struct *is* the checkpoint: everything
/// needed to resume at the current stage after a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeSession {
    /// Session ID
    pub id: Uuid,
    /// The recipe being executed (embedded so resume needs no re-read)
    pub recipe: Recipe,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Index of the next stage to run
    pub current_stage: usize,
    /// Stage index unlocked by the last `approve`, consumed when it runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_stage: Option<usize>,
    /// Accumulated conversation context across completed stages
    pub messages: Vec<Message>,
    /// Per-stage records, parallel to `recipe.stages`
    pub stages: Vec<StageRecord>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp
    pub updated_at: DateTime<Utc>,
}

impl RecipeSession {
    /// Create a new running session for a recipe
    #[must_use]
    pub fn new(recipe: Recipe, initial_context: Option<String>) -> Self {
        let now = Utc::now();
        let stages = recipe
            .stages
            .iter()
            .map(|s| StageRecord::pending(&s.name))
            .collect();
        let messages = initial_context
            .filter(|text| !text.trim().is_empty())
            .map(|text| vec![Message::user(text)])
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            recipe,
            status: SessionStatus::Running,
            current_stage: 0,
            approved_stage: None,
            messages,
            stages,
            created_at: now,
            updated_at: now,
        }
    }

    /// The definition of the stage the cursor points at
    #[must_use]
    pub fn current_stage_def(&self) -> Option<&RecipeStage> {
        self.recipe.stages.get(self.current_stage)
    }

    /// Refresh the transition timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Read-only summary view
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            recipe: self.recipe.name.clone(),
            status: self.status,
            current_stage: self.current_stage,
            total_stages: self.recipe.stages.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Read-only session snapshot for `list`
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Session ID
    pub id: Uuid,
    /// Recipe name
    pub recipe: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Index of the next stage to run
    pub current_stage: usize,
    /// Total stage count
    pub total_stages: usize,
    /// Last transition timestamp
    pub updated_at: DateTime<Utc>,
}

/// A pending approval gate, for `approvals`
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    /// Session ID
    pub session_id: Uuid,
    /// Recipe name
    pub recipe: String,
    /// Gated stage name
    pub stage: String,
    /// Gated stage index
    pub stage_index: usize,
    /// When the session reached the gate
    pub requested_at: DateTime<Utc>,
}

#[cfg(test)]
mod unit {
    use super::*;

    const RECIPE: &str = r#"
name: release
on_deny: skip
stages:
  - name: plan
    prompt: Draft the release plan.
  - name: ship
    prompt: Execute the release plan.
    requires_approval: true
    max_turns: 5
"#;

    #[test]
    fn test_recipe_parses_and_validates() {
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        assert_eq!(recipe.name, "release");
        assert_eq!(recipe.on_deny, DenyPolicy::Skip);
        assert_eq!(recipe.stages.len(), 2);
        assert!(recipe.stages[1].requires_approval);
        assert_eq!(recipe.stages[1].max_turns, Some(5));
        recipe.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_empty_and_duplicates() {
        let empty = Recipe::from_yaml("name: x\nstages: []\n").unwrap();
        assert!(empty.validate().is_err());

        let duplicated = Recipe::from_yaml(
            "name: x\nstages:\n  - {name: a, prompt: p}\n  - {name: a, prompt: q}\n",
        )
        .unwrap();
        assert!(duplicated.validate().is_err());
    }

    #[test]
    fn test_session_starts_at_stage_zero() {
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        let session = RecipeSession::new(recipe, Some("ship v2".to_string()));
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.current_stage, 0);
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.stages.len(), 2);
        assert_eq!(session.stages[0].status, StageStatus::Pending);
    }

    #[test]
    fn test_status_terminality() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::AwaitingApproval.is_terminal());
        assert!(!SessionStatus::Interrupted.is_terminal());
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        let json = serde_json::to_string(&SessionStatus::AwaitingApproval).unwrap();
        assert_eq!(json, "\"awaiting-approval\"");
    }
}
