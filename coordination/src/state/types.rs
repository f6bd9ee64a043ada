//! WorkflowState and the plan/execution records threaded through the graph.
//!
//! `WorkflowState` is an immutable value; every mutation goes through
//! copy-with-updates methods so concurrent readers always see a consistent
//! snapshot (design note: cyclic references, e.g. state -> blocker -> plan
//! step, are expressed as ids into sibling collections, never back-pointers).

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque tracker issue record. The orchestrator treats an issue as fetched
/// by id; tracker adapters (GitHub/Jira/Noop) are out of scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// `workflowStatus` per spec §3/§4.A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Blocked,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// True for the three terminal statuses (spec invariant 3).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::Blocked => "blocked",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Pure transition-rule check over `workflowStatus` (spec §4.A edge table).
/// Forbidden transitions are raised by callers and never persisted
/// (invariant 2).
pub fn validate_transition(current: WorkflowStatus, target: WorkflowStatus) -> bool {
    use WorkflowStatus::*;
    matches!(
        (current, target),
        (Pending, InProgress)
            | (Pending, Cancelled)
            | (InProgress, Blocked)
            | (InProgress, Completed)
            | (InProgress, Failed)
            | (InProgress, Cancelled)
            | (Blocked, InProgress)
            | (Blocked, Failed)
            | (Blocked, Cancelled)
    )
}

/// `developerStatus` per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeveloperStatus {
    Executing,
    BatchComplete,
    Blocked,
    AllDone,
}

/// Tri-state human approval flag (`unset`/`yes`/`no`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    #[default]
    Unset,
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Per-profile trust level governing `should_checkpoint` (spec §4.F
/// trust-level policy table / §4.C profile record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Paranoid,
    #[default]
    Standard,
    Autonomous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Code,
    Command,
    Validation,
}

/// A single unit of work inside an `ExecutionBatch`. Immutable once created
/// (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub action_type: ActionType,
    pub risk_level: RiskLevel,
    pub depends_on: Vec<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub fallback_commands: Vec<String>,
    pub file_path: Option<String>,
    pub code_change: Option<String>,
    pub validation_command: Option<String>,
    #[serde(default = "default_exit_code")]
    pub expect_exit_code: i32,
    pub expected_output_pattern: Option<String>,
    pub cwd: Option<String>,
    #[serde(default)]
    pub requires_human_judgment: bool,
}

fn default_exit_code() -> i32 {
    0
}

impl PlanStep {
    pub fn new(id: impl Into<String>, description: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            action_type,
            risk_level: RiskLevel::Low,
            depends_on: Vec::new(),
            command: None,
            fallback_commands: Vec::new(),
            file_path: None,
            code_change: None,
            validation_command: None,
            expect_exit_code: 0,
            expected_output_pattern: None,
            cwd: None,
            requires_human_judgment: false,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_fallback_commands(mut self, commands: Vec<String>) -> Self {
        self.fallback_commands = commands;
        self
    }

    pub fn with_expected_output_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.expected_output_pattern = Some(pattern.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionBatch {
    pub batch_number: u32,
    pub steps: Vec<PlanStep>,
    pub risk_summary: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionPlan {
    pub goal: String,
    pub batches: Vec<ExecutionBatch>,
    pub total_estimated_minutes: Option<u32>,
}

impl ExecutionPlan {
    /// All `PlanStep`s across every batch, in declared order.
    pub fn all_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.batches.iter().flat_map(|b| b.steps.iter())
    }

    pub fn find_step(&self, step_id: &str) -> Option<&PlanStep> {
        self.all_steps().find(|s| s.id == step_id)
    }

    /// Invariant 5: every `dependsOn` id exists in the plan and the
    /// dependency graph is acyclic. Returns the first violation found.
    pub fn validate_dependencies(&self) -> Result<(), PlanValidationError> {
        use std::collections::HashMap;

        let by_id: HashMap<&str, &PlanStep> =
            self.all_steps().map(|s| (s.id.as_str(), s)).collect();

        for step in self.all_steps() {
            for dep in &step.depends_on {
                if !by_id.contains_key(dep.as_str()) {
                    return Err(PlanValidationError::DanglingDependency {
                        step_id: step.id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        // Topological sort via Kahn's algorithm; a remaining step after the
        // queue drains means a cycle exists.
        let mut in_degree: HashMap<&str, usize> =
            by_id.keys().map(|id| (*id, 0)).collect();
        for step in self.all_steps() {
            for dep in &step.depends_on {
                *in_degree.get_mut(step.id.as_str()).unwrap() += 1;
                let _ = dep; // dep existence already checked above
            }
        }
        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop() {
            visited += 1;
            for step in self.all_steps() {
                if step.depends_on.iter().any(|d| d == id) {
                    let deg = in_degree.get_mut(step.id.as_str()).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push(step.id.as_str());
                    }
                }
            }
        }
        if visited != by_id.len() {
            return Err(PlanValidationError::CyclicDependency);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanValidationError {
    #[error("step {step_id} depends on unknown step {missing}")]
    DanglingDependency { step_id: String, missing: String },
    #[error("plan step dependency graph contains a cycle")]
    CyclicDependency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub executed_command: Option<String>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Complete,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BlockerType {
    CommandFailed,
    ValidationFailed,
    UnexpectedState,
    Precondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockerReport {
    pub step_id: String,
    pub step_description: String,
    pub blocker_type: BlockerType,
    pub error_message: String,
    #[serde(default)]
    pub attempted_actions: Vec<String>,
    #[serde(default)]
    pub suggested_resolutions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_number: u32,
    pub status: BatchStatus,
    pub completed_steps: Vec<StepResult>,
    pub blocker: Option<BlockerReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub reviewer_persona: String,
    pub approved: bool,
    pub comments: Vec<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitSnapshot {
    pub head_commit: String,
    pub dirty_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchApproval {
    pub batch_number: u32,
    pub approved: bool,
    pub feedback: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub workflow_id: Uuid,
    pub agent: String,
    pub model: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cache_read_tokens: Option<u64>,
    pub cache_creation_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// The single record threaded through the graph (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: Uuid,
    pub issue_id: String,
    pub issue: Option<Issue>,
    pub profile_id: String,

    pub worktree_path: Option<String>,
    pub worktree_name: Option<String>,
    pub base_commit: Option<String>,

    pub goal: String,
    pub plan_markdown: String,
    pub plan_path: Option<String>,
    pub key_files: Vec<String>,

    pub execution_plan: Option<ExecutionPlan>,
    pub current_batch_index: usize,

    pub total_tasks: Option<usize>,
    pub current_task_index: usize,
    pub task_review_iteration: u32,

    pub workflow_status: WorkflowStatus,
    pub developer_status: DeveloperStatus,

    pub human_approved: TriState,
    pub human_feedback: String,

    pub current_blocker: Option<BlockerReport>,
    pub blocker_resolution: Option<String>,

    pub last_review: Option<ReviewResult>,
    pub review_iteration: u32,
    pub code_changes_for_review: Option<String>,

    pub driver_session_id: Option<String>,
    pub batch_approvals: Vec<BatchApproval>,
    pub skipped_step_ids: HashSet<String>,

    /// Resolved from the profile at `startWorkflow` (spec §4.C `profiles`
    /// record); governs `should_checkpoint` (spec §4.F).
    pub trust_level: TrustLevel,
    pub checkpoints_enabled: bool,
    /// Resolved `strftime`-style plan path pattern (spec §6, falls back to
    /// the orchestrator's default when the profile doesn't override it).
    pub plan_path_pattern: String,
    /// Reviewer personas to run competitively (spec §8 Scenario 4); a
    /// single persona or an empty list means `reviewer_node` uses the
    /// graph's default single-persona reviewer.
    pub reviewer_personas: Vec<String>,
    /// Results for steps already completed within the current batch
    /// attempt, keyed by step id. Preserved across a free-text blocker
    /// retry so a retry doesn't re-execute work already done (spec §4.F).
    pub batch_step_results: HashMap<String, StepResult>,
    /// Append-only history of completed batches (spec §4.C).
    pub batch_results: Vec<BatchResult>,
}

/// Default plan-path pattern when no profile overrides it (spec §6, §8
/// Scenario 1).
pub const DEFAULT_PLAN_PATH_PATTERN: &str = "docs/plans/%Y-%m-%d-{issue_id}.md";

impl WorkflowState {
    /// Construct a freshly-started workflow (orchestrator `startWorkflow`).
    pub fn new(issue_id: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            workflow_id: Uuid::new_v4(),
            issue_id: issue_id.into(),
            issue: None,
            profile_id: profile_id.into(),
            worktree_path: None,
            worktree_name: None,
            base_commit: None,
            goal: String::new(),
            plan_markdown: String::new(),
            plan_path: None,
            key_files: Vec::new(),
            execution_plan: None,
            current_batch_index: 0,
            total_tasks: None,
            current_task_index: 0,
            task_review_iteration: 0,
            workflow_status: WorkflowStatus::Pending,
            developer_status: DeveloperStatus::Executing,
            human_approved: TriState::Unset,
            human_feedback: String::new(),
            current_blocker: None,
            blocker_resolution: None,
            last_review: None,
            review_iteration: 0,
            code_changes_for_review: None,
            driver_session_id: None,
            batch_approvals: Vec::new(),
            skipped_step_ids: HashSet::new(),
            trust_level: TrustLevel::default(),
            checkpoints_enabled: true,
            plan_path_pattern: DEFAULT_PLAN_PATH_PATTERN.to_string(),
            reviewer_personas: Vec::new(),
            batch_step_results: HashMap::new(),
            batch_results: Vec::new(),
        }
    }

    /// Attempt to move to `target`, returning the updated state or an error
    /// describing the illegal edge (invariant 2).
    pub fn transition_to(&self, target: WorkflowStatus) -> Result<Self, IllegalTransition> {
        if !validate_transition(self.workflow_status, target) {
            return Err(IllegalTransition {
                from: self.workflow_status,
                to: target,
            });
        }
        let mut next = self.clone();
        next.workflow_status = target;
        Ok(next)
    }

    /// `currentTaskIndex < totalTasks` whenever `totalTasks` is set
    /// (invariant 4).
    pub fn task_index_in_bounds(&self) -> bool {
        match self.total_tasks {
            Some(total) => self.current_task_index < total,
            None => true,
        }
    }

    /// `baseCommit` non-empty while `in_progress` (invariant 6).
    pub fn base_commit_invariant_holds(&self) -> bool {
        if self.workflow_status != WorkflowStatus::InProgress {
            return true;
        }
        self.base_commit.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// `batchApprovals` append-only, at most one entry per batch number
    /// (invariant 7).
    pub fn record_batch_approval(&self, approval: BatchApproval) -> Result<Self, String> {
        if self
            .batch_approvals
            .iter()
            .any(|a| a.batch_number == approval.batch_number)
        {
            return Err(format!(
                "batch {} already has a recorded approval",
                approval.batch_number
            ));
        }
        let mut next = self.clone();
        next.batch_approvals.push(approval);
        Ok(next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal workflow transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_from_pending() {
        assert!(validate_transition(WorkflowStatus::Pending, WorkflowStatus::InProgress));
        assert!(validate_transition(WorkflowStatus::Pending, WorkflowStatus::Cancelled));
        assert!(!validate_transition(WorkflowStatus::Pending, WorkflowStatus::Completed));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for target in [
            WorkflowStatus::Pending,
            WorkflowStatus::InProgress,
            WorkflowStatus::Blocked,
            WorkflowStatus::Completed,
            WorkflowStatus::Failed,
            WorkflowStatus::Cancelled,
        ] {
            for terminal in [
                WorkflowStatus::Completed,
                WorkflowStatus::Failed,
                WorkflowStatus::Cancelled,
            ] {
                assert!(!validate_transition(terminal, target));
            }
        }
    }

    #[test]
    fn transition_to_rejects_illegal_edge() {
        let state = WorkflowState::new("ISSUE-1", "default");
        let err = state.transition_to(WorkflowStatus::Completed).unwrap_err();
        assert_eq!(err.from, WorkflowStatus::Pending);
        assert_eq!(err.to, WorkflowStatus::Completed);
    }

    #[test]
    fn transition_to_accepts_legal_edge() {
        let state = WorkflowState::new("ISSUE-1", "default");
        let next = state.transition_to(WorkflowStatus::InProgress).unwrap();
        assert_eq!(next.workflow_status, WorkflowStatus::InProgress);
        // original untouched -- copy-with-updates
        assert_eq!(state.workflow_status, WorkflowStatus::Pending);
    }

    #[test]
    fn batch_approvals_reject_duplicates() {
        let state = WorkflowState::new("ISSUE-1", "default");
        let approval = BatchApproval {
            batch_number: 1,
            approved: true,
            feedback: None,
            timestamp: Utc::now(),
        };
        let next = state.record_batch_approval(approval.clone()).unwrap();
        assert!(next.record_batch_approval(approval).is_err());
    }

    #[test]
    fn task_index_bounds() {
        let mut state = WorkflowState::new("ISSUE-1", "default");
        state.total_tasks = Some(3);
        state.current_task_index = 2;
        assert!(state.task_index_in_bounds());
        state.current_task_index = 3;
        assert!(!state.task_index_in_bounds());
    }

    #[test]
    fn base_commit_required_while_in_progress() {
        let mut state = WorkflowState::new("ISSUE-1", "default");
        state.workflow_status = WorkflowStatus::InProgress;
        assert!(!state.base_commit_invariant_holds());
        state.base_commit = Some("abc123".into());
        assert!(state.base_commit_invariant_holds());
    }

    #[test]
    fn state_json_round_trips() {
        let mut state = WorkflowState::new("ISSUE-1", "default");
        state.goal = "Implement feature X".to_string();
        let json = serde_json::to_string(&state).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.goal, state.goal);
        assert_eq!(back.workflow_id, state.workflow_id);
    }

    fn chain_plan() -> ExecutionPlan {
        let a = PlanStep::new("A", "first", ActionType::Command);
        let b = PlanStep::new("B", "second", ActionType::Command).with_depends_on(vec!["A".into()]);
        let c = PlanStep::new("C", "third", ActionType::Command).with_depends_on(vec!["B".into()]);
        ExecutionPlan {
            goal: "chain".into(),
            batches: vec![ExecutionBatch {
                batch_number: 1,
                steps: vec![a, b, c],
                risk_summary: RiskLevel::Low,
                description: "chain batch".into(),
            }],
            total_estimated_minutes: None,
        }
    }

    #[test]
    fn acyclic_chain_validates() {
        assert!(chain_plan().validate_dependencies().is_ok());
    }

    #[test]
    fn dangling_dependency_is_rejected() {
        let step = PlanStep::new("A", "first", ActionType::Command)
            .with_depends_on(vec!["ghost".into()]);
        let plan = ExecutionPlan {
            goal: "g".into(),
            batches: vec![ExecutionBatch {
                batch_number: 1,
                steps: vec![step],
                risk_summary: RiskLevel::Low,
                description: "d".into(),
            }],
            total_estimated_minutes: None,
        };
        assert!(matches!(
            plan.validate_dependencies(),
            Err(PlanValidationError::DanglingDependency { .. })
        ));
    }

    #[test]
    fn cyclic_dependency_is_rejected() {
        let a = PlanStep::new("A", "a", ActionType::Command).with_depends_on(vec!["B".into()]);
        let b = PlanStep::new("B", "b", ActionType::Command).with_depends_on(vec!["A".into()]);
        let plan = ExecutionPlan {
            goal: "g".into(),
            batches: vec![ExecutionBatch {
                batch_number: 1,
                steps: vec![a, b],
                risk_summary: RiskLevel::Low,
                description: "d".into(),
            }],
            total_estimated_minutes: None,
        };
        assert!(matches!(
            plan.validate_dependencies(),
            Err(PlanValidationError::CyclicDependency)
        ));
    }
}
