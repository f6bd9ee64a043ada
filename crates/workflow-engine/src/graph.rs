//! Workflow graph runtime (spec component F): a static, compiled graph of
//! nine named nodes with conditional routing, typed interrupts, and
//! structured-mode step execution — grounded on `state_machine::
//! StateMachine` (legal-transition table, per-state budgets), generalized
//! from one linear `OrchestratorState` enum into a
//! node-graph interpreter where edges are computed from a node's output
//! rather than declared as a fixed successor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use schemars::schema_for;
use thiserror::Error;
use uuid::Uuid;

use coordination::git::{GitError, GitIsolation, WorktreeHandle};
use coordination::state::{
    ActionType, BatchApproval, BatchResult, BatchStatus, BlockerReport, BlockerType,
    DeveloperStatus, ExecutionBatch, ExecutionPlan, IllegalTransition, PlanStep,
    PlanValidationError, ReviewResult, RiskLevel, StepResult, StepStatus, TriState, TrustLevel,
    WorkflowState, WorkflowStatus,
};

use crate::agents::developer::get_cascade_skips;
use crate::agents::reviewer::competitive_review;
use crate::agents::{Architect, Developer, Reviewer};
use crate::driver::DriverError;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error(transparent)]
    PlanValidation(#[from] PlanValidationError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("workflow {0} has no worktree path recorded")]
    NoWorktree(Uuid),
    #[error("workflow has no plan path recorded")]
    NoPlanPath,
    #[error("workflow has no base commit recorded")]
    NoBaseCommit,
    #[error("could not read plan file {path}: {source}")]
    PlanFileRead { path: String, source: std::io::Error },
    #[error("could not write plan file {path}: {source}")]
    PlanFileWrite { path: String, source: std::io::Error },
    #[error("batch {0} already has a recorded approval")]
    DuplicateApproval(u32),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// The nine named nodes of the compiled graph (spec §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Architect,
    PlanValidator,
    HumanApproval,
    Developer,
    BatchApproval,
    BlockerResolution,
    Reviewer,
    DeveloperForReview,
    End,
}

impl GraphNode {
    pub fn as_str(self) -> &'static str {
        match self {
            GraphNode::Architect => "architect_node",
            GraphNode::PlanValidator => "plan_validator_node",
            GraphNode::HumanApproval => "human_approval_node",
            GraphNode::Developer => "developer_node",
            GraphNode::BatchApproval => "batch_approval_node",
            GraphNode::BlockerResolution => "blocker_resolution_node",
            GraphNode::Reviewer => "reviewer_node",
            GraphNode::DeveloperForReview => "developer_node_for_review",
            GraphNode::End => "end",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        Some(match raw {
            "architect_node" => GraphNode::Architect,
            "plan_validator_node" => GraphNode::PlanValidator,
            "human_approval_node" => GraphNode::HumanApproval,
            "developer_node" => GraphNode::Developer,
            "batch_approval_node" => GraphNode::BatchApproval,
            "blocker_resolution_node" => GraphNode::BlockerResolution,
            "reviewer_node" => GraphNode::Reviewer,
            "developer_node_for_review" => GraphNode::DeveloperForReview,
            "end" => GraphNode::End,
            _ => return None,
        })
    }
}

impl std::fmt::Display for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the caller should do after a node runs: keep going, pause for an
/// external input, or stop (the workflow reached a terminal status).
#[derive(Debug)]
pub enum StepOutcome {
    Continue { next: GraphNode, state: WorkflowState },
    Interrupt { node: GraphNode, state: WorkflowState },
    Terminal { state: WorkflowState },
}

/// Whether a batch at `batch_risk` requires a human checkpoint under
/// `trust_level`, given whether batch checkpoints are enabled for this
/// profile at all.
pub fn should_checkpoint(batch_risk: RiskLevel, trust_level: TrustLevel, checkpoints_enabled: bool) -> bool {
    if !checkpoints_enabled {
        return false;
    }
    match trust_level {
        TrustLevel::Paranoid | TrustLevel::Standard => true,
        TrustLevel::Autonomous => batch_risk == RiskLevel::High,
    }
}

/// Result of `_filesystem_checks` (spec §4.F structured-mode pre-validation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsCheckResult {
    pub ok: bool,
    pub issue: Option<String>,
    pub suggestions: Vec<String>,
}

impl FsCheckResult {
    fn pass() -> Self {
        Self { ok: true, issue: None, suggestions: Vec::new() }
    }

    fn fail(issue: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self { ok: false, issue: Some(issue.into()), suggestions }
    }
}

fn resolves_on_path(program: &str) -> bool {
    if Path::new(program).is_absolute() {
        return Path::new(program).exists();
    }
    let Some(path_var) = std::env::var_os("PATH") else { return false };
    std::env::split_paths(&path_var).any(|dir| dir.join(program).exists())
}

/// `_filesystem_checks(step)` (spec §4.F): cheap, no-LLM preconditions a
/// step must satisfy before execution is attempted.
pub fn filesystem_checks(step: &PlanStep, cwd: &str) -> FsCheckResult {
    match step.action_type {
        ActionType::Code => {
            let Some(file_path) = &step.file_path else { return FsCheckResult::pass() };
            let target = Path::new(cwd).join(file_path);
            if target.exists() || target.parent().is_some_and(|p| p.exists()) {
                FsCheckResult::pass()
            } else {
                FsCheckResult::fail(
                    format!("neither {file_path} nor its parent directory exist"),
                    vec![format!("create the parent directory for {file_path} first")],
                )
            }
        }
        ActionType::Command | ActionType::Validation => {
            let Some(command) = &step.command else { return FsCheckResult::pass() };
            let program = command.split_whitespace().next().unwrap_or("");
            if !resolves_on_path(program) {
                return FsCheckResult::fail(
                    format!("`{program}` does not resolve on PATH"),
                    vec![format!("install {program} or correct the step's command")],
                );
            }
            if let Some(step_cwd) = &step.cwd {
                if !Path::new(cwd).join(step_cwd).exists() {
                    return FsCheckResult::fail(
                        format!("working directory {step_cwd} does not exist"),
                        vec![format!("create {step_cwd} before running this step")],
                    );
                }
            }
            FsCheckResult::pass()
        }
    }
}

/// `_pre_validate_step(step, state)`: filesystem checks only. LLM-based
/// validation is reserved for higher risk levels and is currently a no-op
/// placeholder, per spec.
pub fn pre_validate_step(step: &PlanStep, cwd: &str) -> FsCheckResult {
    filesystem_checks(step, cwd)
}

fn handle_for(state: &WorkflowState) -> GraphResult<WorktreeHandle> {
    let path = state.worktree_path.clone().ok_or(GraphError::NoWorktree(state.workflow_id))?;
    let branch = state
        .worktree_name
        .clone()
        .unwrap_or_else(|| format!("workflow/{}", state.workflow_id));
    Ok(WorktreeHandle { path: PathBuf::from(path), branch, workflow_id: state.workflow_id.to_string() })
}

enum BatchOutcome {
    Completed(Vec<StepResult>),
    /// Blocked partway through a batch; carries the results of whatever
    /// steps completed before the block so a retry doesn't redo them.
    Blocked(BlockerReport, Vec<StepResult>),
}

pub struct Graph {
    architect: Architect,
    developer: Developer,
    reviewer: ReviewerMode,
    git: Arc<GitIsolation>,
}

pub enum ReviewerMode {
    Single(Reviewer),
    Competitive(Vec<Reviewer>),
}

impl Graph {
    pub fn new(architect: Architect, developer: Developer, reviewer: ReviewerMode, git: Arc<GitIsolation>) -> Self {
        Self { architect, developer, reviewer, git }
    }

    /// Advance the workflow from `node`, given its current `state`.
    pub async fn step(&self, node: GraphNode, state: WorkflowState) -> GraphResult<StepOutcome> {
        match node {
            GraphNode::Architect => self.architect_node(state).await,
            GraphNode::PlanValidator => self.plan_validator_node(state).await,
            GraphNode::HumanApproval => self.human_approval_node(state),
            GraphNode::Developer => self.developer_node(state).await,
            GraphNode::BatchApproval => self.batch_approval_node(state),
            GraphNode::BlockerResolution => self.blocker_resolution_node(state),
            GraphNode::Reviewer => self.reviewer_node(state).await,
            GraphNode::DeveloperForReview => self.developer_node_for_review(state).await,
            GraphNode::End => Ok(StepOutcome::Terminal { state }),
        }
    }

    async fn architect_node(&self, state: WorkflowState) -> GraphResult<StepOutcome> {
        let goal = state
            .issue
            .as_ref()
            .map(|issue| format!("{}\n\n{}", issue.title, issue.body))
            .unwrap_or_else(|| state.goal.clone());
        let context = state.key_files.join("\n");

        let plan = self.architect.draft_plan(&goal, &context).await?;

        let handle = handle_for(&state)?;
        let plan_path = render_plan_path(&state.plan_path_pattern, &state.issue_id, chrono_now());
        let full_path = handle.path.join(&plan_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| GraphError::PlanFileWrite { path: plan_path.clone(), source })?;
        }
        std::fs::write(&full_path, &plan.plan_markdown)
            .map_err(|source| GraphError::PlanFileWrite { path: plan_path.clone(), source })?;

        let mut next = state.clone();
        next.goal = goal;
        next.plan_path = Some(plan_path.clone());
        next.key_files = plan.key_files;

        Ok(StepOutcome::Continue { next: GraphNode::PlanValidator, state: next })
    }

    async fn plan_validator_node(&self, state: WorkflowState) -> GraphResult<StepOutcome> {
        let handle = handle_for(&state)?;
        let plan_path = state.plan_path.clone().ok_or(GraphError::NoPlanPath)?;
        let full_path = handle.path.join(&plan_path);
        let raw_markdown = std::fs::read_to_string(&full_path)
            .map_err(|source| GraphError::PlanFileRead { path: plan_path.clone(), source })?;

        let schema = schema_for!(ExecutionPlan);
        let schema_value = serde_json::to_value(&schema)
            .map_err(|e| DriverError::MalformedOutput(format!("failed to serialize schema: {e}")))?;
        let prompt = format!("Extract a structured execution plan (batches of steps) from this markdown:\n\n{raw_markdown}");
        let result = self.architect.driver().generate(&prompt, None, Some(&schema_value)).await?;
        let execution_plan = crate::contracts::parse_execution_plan(&result.text, &state.goal);
        execution_plan.validate_dependencies()?;

        let mut next = state.clone();
        next.plan_markdown = raw_markdown;
        next.execution_plan = Some(execution_plan);
        next.current_batch_index = 0;

        Ok(StepOutcome::Continue { next: GraphNode::HumanApproval, state: next })
    }

    fn human_approval_node(&self, state: WorkflowState) -> GraphResult<StepOutcome> {
        if state.human_approved == TriState::Unset {
            return Ok(StepOutcome::Interrupt { node: GraphNode::HumanApproval, state });
        }

        let approved = state.human_approved == TriState::Yes;
        let mut next = state.clone();
        next.human_approved = TriState::Unset;
        next.human_feedback.clear();

        if approved {
            next.developer_status = DeveloperStatus::Executing;
            Ok(StepOutcome::Continue { next: GraphNode::Developer, state: next })
        } else {
            next = next.transition_to(WorkflowStatus::Failed)?;
            Ok(StepOutcome::Terminal { state: next })
        }
    }

    fn batch_approval_node(&self, state: WorkflowState) -> GraphResult<StepOutcome> {
        if state.human_approved == TriState::Unset {
            return Ok(StepOutcome::Interrupt { node: GraphNode::BatchApproval, state });
        }

        let approved = state.human_approved == TriState::Yes;
        let approval = BatchApproval {
            batch_number: state.current_batch_index as u32,
            approved,
            feedback: (!state.human_feedback.is_empty()).then(|| state.human_feedback.clone()),
            timestamp: state.batch_approvals.last().map(|a| a.timestamp).unwrap_or_else(chrono_now),
        };

        let mut next = state
            .record_batch_approval(approval)
            .map_err(|_| GraphError::DuplicateApproval(state.current_batch_index as u32))?;
        next.human_approved = TriState::Unset;
        next.human_feedback.clear();

        if approved {
            next.current_batch_index += 1;
            next.developer_status = DeveloperStatus::Executing;
            Ok(StepOutcome::Continue { next: GraphNode::Developer, state: next })
        } else {
            next = next.transition_to(WorkflowStatus::Failed)?;
            Ok(StepOutcome::Terminal { state: next })
        }
    }

    fn blocker_resolution_node(&self, state: WorkflowState) -> GraphResult<StepOutcome> {
        let Some(resolution) = state.blocker_resolution.clone() else {
            return Ok(StepOutcome::Interrupt { node: GraphNode::BlockerResolution, state });
        };

        let mut next = state.clone();
        next.blocker_resolution = None;

        match resolution.as_str() {
            "skip" => {
                if let Some(blocker) = next.current_blocker.take() {
                    next.skipped_step_ids.insert(blocker.step_id.clone());
                    if let Some(plan) = &next.execution_plan {
                        let all: Vec<PlanStep> = plan.all_steps().cloned().collect();
                        for (id, _reason) in get_cascade_skips(&blocker.step_id, &all) {
                            next.skipped_step_ids.insert(id);
                        }
                    }
                }
                next = next.transition_to(WorkflowStatus::InProgress).unwrap_or(next);
                next.developer_status = DeveloperStatus::Executing;
                Ok(StepOutcome::Continue { next: GraphNode::Developer, state: next })
            }
            "abort" => {
                next = next.transition_to(WorkflowStatus::Failed)?;
                Ok(StepOutcome::Terminal { state: next })
            }
            _ => {
                // Free-text resolution: retry the blocked step.
                next.current_blocker = None;
                next = next.transition_to(WorkflowStatus::InProgress).unwrap_or(next);
                next.developer_status = DeveloperStatus::Executing;
                Ok(StepOutcome::Continue { next: GraphNode::Developer, state: next })
            }
        }
    }

    async fn developer_node(&self, state: WorkflowState) -> GraphResult<StepOutcome> {
        let handle = handle_for(&state)?;
        let mut next = state.clone();
        next.base_commit = Some(self.git.head_commit(&handle)?);

        let Some(plan) = next.execution_plan.clone() else {
            next.developer_status = DeveloperStatus::AllDone;
            return Ok(StepOutcome::Continue { next: GraphNode::Reviewer, state: next });
        };
        let Some(batch) = plan.batches.get(next.current_batch_index).cloned() else {
            next.developer_status = DeveloperStatus::AllDone;
            return Ok(StepOutcome::Continue { next: GraphNode::Reviewer, state: next });
        };

        match self.run_batch(&batch, &next, &handle).await? {
            BatchOutcome::Completed(results) => {
                self.git.commit_all(&handle, &format!("batch {}", batch.batch_number)).ok();
                next.batch_results.push(BatchResult {
                    batch_number: batch.batch_number,
                    status: BatchStatus::Complete,
                    completed_steps: results,
                    blocker: None,
                });
                next.batch_step_results.clear();

                let is_last_batch = next.current_batch_index + 1 >= plan.batches.len();
                if is_last_batch {
                    next.developer_status = DeveloperStatus::AllDone;
                    Ok(StepOutcome::Continue { next: GraphNode::Reviewer, state: next })
                } else if should_checkpoint(batch.risk_summary, next.trust_level, next.checkpoints_enabled) {
                    next.developer_status = DeveloperStatus::BatchComplete;
                    Ok(StepOutcome::Continue { next: GraphNode::BatchApproval, state: next })
                } else {
                    next.current_batch_index += 1;
                    next.developer_status = DeveloperStatus::Executing;
                    Ok(StepOutcome::Continue { next: GraphNode::Developer, state: next })
                }
            }
            BatchOutcome::Blocked(blocker, partial) => {
                for result in partial {
                    next.batch_step_results.insert(result.step_id.clone(), result);
                }
                next.current_blocker = Some(blocker);
                next.developer_status = DeveloperStatus::Blocked;
                next = next.transition_to(WorkflowStatus::Blocked).unwrap_or(next);
                Ok(StepOutcome::Continue { next: GraphNode::BlockerResolution, state: next })
            }
        }
    }

    async fn developer_node_for_review(&self, state: WorkflowState) -> GraphResult<StepOutcome> {
        let handle = handle_for(&state)?;
        let comments = state.last_review.as_ref().map(|r| r.comments.clone()).unwrap_or_default();

        let steps: Vec<PlanStep> = comments
            .iter()
            .enumerate()
            .map(|(i, comment)| PlanStep::new(format!("fixup-{i}"), comment.clone(), ActionType::Code))
            .collect();
        let synthetic_batch = ExecutionBatch {
            batch_number: u32::MAX,
            steps,
            risk_summary: RiskLevel::Medium,
            description: "review fixup".to_string(),
        };

        let mut next = state.clone();
        next.base_commit = Some(self.git.head_commit(&handle)?);
        next.batch_step_results.clear();
        match self.run_batch(&synthetic_batch, &next, &handle).await? {
            BatchOutcome::Completed(_) => {
                self.git.commit_all(&handle, "review fixup").ok();
                Ok(StepOutcome::Continue { next: GraphNode::Reviewer, state: next })
            }
            BatchOutcome::Blocked(blocker, partial) => {
                for result in partial {
                    next.batch_step_results.insert(result.step_id.clone(), result);
                }
                next.current_blocker = Some(blocker);
                next = next.transition_to(WorkflowStatus::Failed).unwrap_or(next);
                Ok(StepOutcome::Terminal { state: next })
            }
        }
    }

    async fn reviewer_node(&self, state: WorkflowState) -> GraphResult<StepOutcome> {
        let handle = handle_for(&state)?;
        let base = state.base_commit.clone().ok_or(GraphError::NoBaseCommit)?;
        let diff = self.git.diff_since(&handle, &base)?;

        let mut next = state.clone();
        let review = if diff.trim().is_empty() {
            ReviewResult {
                reviewer_persona: "auto".to_string(),
                approved: true,
                comments: vec!["empty diff, auto-approved".to_string()],
                severity: coordination::state::Severity::Low,
            }
        } else {
            let descriptions: Vec<String> = next
                .execution_plan
                .as_ref()
                .map(|p| p.all_steps().map(|s| s.description.clone()).collect())
                .unwrap_or_default();

            if next.reviewer_personas.len() >= 2 {
                let driver = self.architect.driver();
                let reviewers: Vec<Reviewer> = next
                    .reviewer_personas
                    .iter()
                    .map(|persona| Reviewer::with_persona(driver.clone(), persona.clone()))
                    .collect();
                competitive_review(&reviewers, &diff, &descriptions).await?
            } else {
                match &self.reviewer {
                    ReviewerMode::Single(reviewer) => reviewer.review_batch(&diff, &descriptions).await?,
                    ReviewerMode::Competitive(reviewers) => competitive_review(reviewers, &diff, &descriptions).await?,
                }
            }
        };

        next.last_review = Some(review.clone());
        next.code_changes_for_review = Some(diff);
        next.review_iteration += 1;

        if review.approved {
            next = next.transition_to(WorkflowStatus::Completed)?;
            Ok(StepOutcome::Terminal { state: next })
        } else if next.review_iteration >= 3 {
            next = next.transition_to(WorkflowStatus::Failed)?;
            Ok(StepOutcome::Terminal { state: next })
        } else {
            Ok(StepOutcome::Continue { next: GraphNode::DeveloperForReview, state: next })
        }
    }

    async fn run_batch(&self, batch: &ExecutionBatch, state: &WorkflowState, handle: &WorktreeHandle) -> GraphResult<BatchOutcome> {
        let cwd = handle.path.to_string_lossy().into_owned();
        let mut results = Vec::new();

        for step in &batch.steps {
            if state.skipped_step_ids.contains(&step.id) {
                continue;
            }

            if let Some(cached) = state.batch_step_results.get(&step.id) {
                results.push(cached.clone());
                continue;
            }

            let check = pre_validate_step(step, &cwd);
            if !check.ok {
                return Ok(BatchOutcome::Blocked(
                    BlockerReport {
                        step_id: step.id.clone(),
                        step_description: step.description.clone(),
                        blocker_type: BlockerType::UnexpectedState,
                        error_message: check.issue.unwrap_or_default(),
                        attempted_actions: Vec::new(),
                        suggested_resolutions: check.suggestions,
                    },
                    results,
                ));
            }

            let result = if step.command.is_some() || step.code_change.is_some() {
                self.developer.execute_step(step, &cwd)
            } else {
                match self.developer.execute_step_agentic(step, &cwd).await? {
                    Some(text) => StepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Completed,
                        output: Some(text),
                        error: None,
                        executed_command: None,
                        duration_seconds: 0.0,
                    },
                    None => StepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Failed,
                        output: None,
                        error: Some("agentic run produced no result".to_string()),
                        executed_command: None,
                        duration_seconds: 0.0,
                    },
                }
            };

            if result.status == StepStatus::Failed {
                let blocker_type = match step.action_type {
                    ActionType::Code => BlockerType::ValidationFailed,
                    ActionType::Command | ActionType::Validation => BlockerType::CommandFailed,
                };
                return Ok(BatchOutcome::Blocked(
                    BlockerReport {
                        step_id: step.id.clone(),
                        step_description: step.description.clone(),
                        blocker_type,
                        error_message: result.error.unwrap_or_default(),
                        attempted_actions: result.executed_command.into_iter().collect(),
                        suggested_resolutions: Vec::new(),
                    },
                    results,
                ));
            }

            results.push(result);
        }

        Ok(BatchOutcome::Completed(results))
    }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

/// Filesystem-safe slug for an issue id (spec §6 plan-path pattern
/// `{issue_id}` substitution): lowercased, spaces/underscores collapsed to
/// `-`, truncated to 50 chars.
fn slugify(issue_id: &str) -> String {
    let mut slug = String::with_capacity(issue_id.len());
    for ch in issue_id.chars() {
        match ch {
            'a'..='z' | '0'..='9' => slug.push(ch),
            'A'..='Z' => slug.push(ch.to_ascii_lowercase()),
            ' ' | '_' | '-' => {
                if !slug.ends_with('-') && !slug.is_empty() {
                    slug.push('-');
                }
            }
            _ => {}
        }
    }
    let slug = slug.trim_matches('-');
    slug.chars().take(50).collect()
}

/// Expand a `strftime`-style plan path pattern (spec §6, §8 Scenario 1),
/// substituting `{issue_id}` with `slugify(issue_id)` before handing the
/// rest to `chrono::format`.
fn render_plan_path(pattern: &str, issue_id: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    let with_issue = pattern.replace("{issue_id}", &slugify(issue_id));
    now.format(&with_issue).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::state::ActionType;

    #[test]
    fn should_checkpoint_matches_trust_table() {
        assert!(should_checkpoint(RiskLevel::Low, TrustLevel::Paranoid, true));
        assert!(should_checkpoint(RiskLevel::Low, TrustLevel::Standard, true));
        assert!(!should_checkpoint(RiskLevel::Low, TrustLevel::Autonomous, true));
        assert!(should_checkpoint(RiskLevel::High, TrustLevel::Autonomous, true));
        assert!(!should_checkpoint(RiskLevel::High, TrustLevel::Paranoid, false));
    }

    #[test]
    fn filesystem_checks_code_step_requires_existing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mut step = PlanStep::new("s1", "write file", ActionType::Code);
        step.file_path = Some("missing_dir/file.rs".to_string());
        let result = filesystem_checks(&step, dir.path().to_str().unwrap());
        assert!(!result.ok);
    }

    #[test]
    fn filesystem_checks_code_step_passes_when_parent_exists() {
        let dir = tempfile::tempdir().unwrap();
        let mut step = PlanStep::new("s1", "write file", ActionType::Code);
        step.file_path = Some("file.rs".to_string());
        let result = filesystem_checks(&step, dir.path().to_str().unwrap());
        assert!(result.ok);
    }

    #[test]
    fn filesystem_checks_command_step_rejects_unresolvable_program() {
        let dir = tempfile::tempdir().unwrap();
        let mut step = PlanStep::new("s1", "run", ActionType::Command);
        step.command = Some("definitely-not-a-real-binary-xyz".to_string());
        let result = filesystem_checks(&step, dir.path().to_str().unwrap());
        assert!(!result.ok);
    }

    #[test]
    fn filesystem_checks_command_step_accepts_resolvable_program() {
        let dir = tempfile::tempdir().unwrap();
        let mut step = PlanStep::new("s1", "run", ActionType::Command);
        step.command = Some("sh -c true".to_string());
        let result = filesystem_checks(&step, dir.path().to_str().unwrap());
        assert!(result.ok);
    }

    #[test]
    fn graph_node_round_trips_through_its_string_form() {
        for node in [
            GraphNode::Architect,
            GraphNode::PlanValidator,
            GraphNode::HumanApproval,
            GraphNode::Developer,
            GraphNode::BatchApproval,
            GraphNode::BlockerResolution,
            GraphNode::Reviewer,
            GraphNode::DeveloperForReview,
            GraphNode::End,
        ] {
            assert_eq!(GraphNode::from_str(node.as_str()), Some(node));
        }
    }
}
