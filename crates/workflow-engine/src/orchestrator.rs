//! Orchestrator service (spec component G): workflow lifecycle, per-workflow
//! async task, admission control, and the event-sequence/checkpoint wiring
//! around the graph interpreter (component F).
//!
//! Grounded on the per-issue `orchestration_loop` pattern (one async task
//! per unit of work, concurrency-gated admission) and
//! `coordination::harness::session` (monotonic per-session sequence
//! numbering), generalized from "one implement -> verify -> review loop per
//! issue" to "drive `graph::Graph::step` across the nine named nodes,
//! checkpointing at every completion and pausing at every interrupt."

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use uuid::Uuid;

use coordination::events::{EventBusExt, EventType, SharedEventBus, WorkflowEvent};
use coordination::git::{GitError, GitIsolation, WorktreeHandle};
use coordination::persistence::{ResumeResult, StateCheckpoint, Store, StoreError};
use coordination::state::{Issue, TriState, WorkflowState, WorkflowStatus};

use crate::config::OrchestratorConfig;
use crate::graph::{Graph, GraphError, GraphNode, StepOutcome};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("workflow {0} not found")]
    NotFound(Uuid),
    #[error("at capacity: {0} workflows already running")]
    AtCapacity(usize),
    #[error("workflow {0} is not currently paused waiting for input")]
    NotInterrupted(Uuid),
    #[error("workflow {0} is paused at `{1}`, which does not accept this resume")]
    WrongInterrupt(Uuid, String),
    #[error("exactly one of plan_file or plan_content must be set")]
    InvalidPlanRequest,
    #[error("could not read plan file {path}: {source}")]
    PlanRead { path: String, source: std::io::Error },
    #[error("workflow {0} is mid-execution; pass force=true to replace its plan")]
    UnsafePlanReplacement(Uuid),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Per-workflow bookkeeping the running/paused task and external callers
/// (`cancelWorkflow`, `approveBatch`, `resolveBlocker`) share. Lives only for
/// as long as a workflow is non-terminal; removed on completion/failure/
/// cancellation.
struct WorkflowHandle {
    sequence: AtomicU64,
    cancelled: Arc<AtomicBool>,
    pending_node: Mutex<Option<GraphNode>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflowRequest {
    pub issue: Issue,
    pub profile: String,
    pub worktree_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartWorkflowResponse {
    pub workflow_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub approved: bool,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveBlockerRequest {
    pub resolution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPlanRequest {
    pub plan_file: Option<String>,
    pub plan_content: Option<String>,
    pub force: bool,
}

/// Response shape for `getWorkflow` (spec §6): current state plus a trailing
/// window of the event log, so a fresh client doesn't have to replay the
/// whole history just to render a status page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowView {
    pub state: WorkflowState,
    pub latest_events: Vec<WorkflowEvent>,
}

const LATEST_EVENTS_WINDOW: usize = 50;

/// Singleton workflow orchestrator (spec §4.G). Cheap to clone: every field
/// is itself `Arc`-backed or trivially `Clone`, so handing a clone to each
/// spawned per-workflow task is the intended usage.
#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Store,
    bus: SharedEventBus,
    git: Arc<GitIsolation>,
    graph: Arc<Graph>,
    admission: Arc<Semaphore>,
    handles: Arc<RwLock<HashMap<Uuid, Arc<WorkflowHandle>>>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, store: Store, bus: SharedEventBus, git: Arc<GitIsolation>, graph: Graph) -> Self {
        let admission = Arc::new(Semaphore::new(config.concurrency_cap));
        Self {
            config,
            store,
            bus,
            git,
            graph: Arc::new(graph),
            admission,
            handles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// `startWorkflow(issue, profile, worktreePath?)` (spec §4.G): create
    /// state, set up the worktree (H), and hand off to a spawned task that
    /// drives the graph starting at `architect_node`. Returns as soon as the
    /// task is spawned; the caller observes progress via events or
    /// `getWorkflow`.
    pub async fn start_workflow(&self, request: StartWorkflowRequest) -> OrchestratorResult<StartWorkflowResponse> {
        let permit = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| OrchestratorError::AtCapacity(self.config.concurrency_cap))?;

        let mut state = WorkflowState::new(request.issue.id.clone(), request.profile.clone());
        state.issue = Some(request.issue);

        if let Some(profile) = self.store.get_profile(&request.profile).await? {
            state.trust_level = profile.trust_level;
            state.checkpoints_enabled = profile.checkpoints_enabled;
            state.plan_path_pattern = profile.plan_path_pattern;
            state.reviewer_personas = profile.reviewer_personas;
        } else {
            state.plan_path_pattern = self.config.plan_path_pattern.clone();
        }

        let wt_handle = self.git.create_worktree(&state.workflow_id.to_string()).await?;
        state.worktree_path = Some(
            request
                .worktree_path
                .unwrap_or_else(|| wt_handle.path.display().to_string()),
        );
        state.worktree_name = Some(wt_handle.branch.clone());
        state.base_commit = Some(self.git.head_commit(&wt_handle)?);
        state = state.transition_to(WorkflowStatus::InProgress)?;

        let workflow_id = state.workflow_id;
        self.store.save_workflow(&state).await?;

        self.handles.write().await.insert(
            workflow_id,
            Arc::new(WorkflowHandle {
                sequence: AtomicU64::new(0),
                cancelled: Arc::new(AtomicBool::new(false)),
                pending_node: Mutex::new(None),
            }),
        );
        self.emit(workflow_id, "orchestrator", EventType::AgentStarted, Some("workflow started".to_string()))
            .await?;

        let this = self.clone();
        tokio::spawn(async move {
            this.drive(workflow_id, GraphNode::Architect, state, permit).await;
        });

        Ok(StartWorkflowResponse { workflow_id })
    }

    pub async fn get_workflow(&self, workflow_id: Uuid) -> OrchestratorResult<WorkflowView> {
        let state = self.store.load_workflow(workflow_id).await?;
        let mut events = self.store.replay_log(workflow_id, 0).await?;
        if events.len() > LATEST_EVENTS_WINDOW {
            events = events.split_off(events.len() - LATEST_EVENTS_WINDOW);
        }
        Ok(WorkflowView { state, latest_events: events })
    }

    pub async fn list_workflows(&self) -> OrchestratorResult<Vec<WorkflowState>> {
        Ok(self.store.list_workflows().await?)
    }

    /// `cancelWorkflow(reason)` (spec §4.G / §5): atomically flips the
    /// cancellation flag. A running task observes it at its next node
    /// boundary and drops out on its own (spec §9 Open Question: best-effort
    /// at node boundaries only). A task paused at an interrupt has nothing
    /// polling the flag, so a paused workflow is cancelled synchronously
    /// here instead.
    pub async fn cancel_workflow(&self, workflow_id: Uuid, reason: Option<String>) -> OrchestratorResult<()> {
        let handle = {
            let handles = self.handles.read().await;
            handles.get(&workflow_id).cloned().ok_or(OrchestratorError::NotFound(workflow_id))?
        };
        handle.cancelled.store(true, Ordering::SeqCst);

        let pending = *handle.pending_node.lock().await;
        if pending.is_none() {
            return Ok(());
        }

        let state = self.store.load_workflow(workflow_id).await?;
        let cancelled = state.transition_to(WorkflowStatus::Cancelled)?;
        self.finish(workflow_id, cancelled, EventType::WorkflowCancelled, reason).await
    }

    /// `approveBatch(workflowId, approved, feedback?)` (spec §4.G): resumes
    /// a workflow paused at `human_approval_node` or `batch_approval_node`.
    pub async fn approve_batch(&self, workflow_id: Uuid, request: ApproveRequest) -> OrchestratorResult<()> {
        let node = self
            .take_pending(workflow_id, &[GraphNode::HumanApproval, GraphNode::BatchApproval])
            .await?;
        let mut state = self.store.load_workflow(workflow_id).await?;
        state.human_approved = if request.approved { TriState::Yes } else { TriState::No };
        state.human_feedback = request.feedback.unwrap_or_default();
        self.resume(workflow_id, node, state).await
    }

    /// `resolveBlocker(workflowId, resolution)` (spec §4.G): resumes a
    /// workflow paused at `blocker_resolution_node`.
    pub async fn resolve_blocker(&self, workflow_id: Uuid, request: ResolveBlockerRequest) -> OrchestratorResult<()> {
        let node = self.take_pending(workflow_id, &[GraphNode::BlockerResolution]).await?;
        let mut state = self.store.load_workflow(workflow_id).await?;
        state.blocker_resolution = Some(request.resolution);
        self.resume(workflow_id, node, state).await
    }

    /// `setWorkflowPlan(workflowId, planFile|planContent, force)` (spec
    /// §4.G): replaces `planMarkdown` between nodes. Safe without `force`
    /// only while the workflow is paused at `human_approval_node` (the plan
    /// hasn't been acted on by the developer yet) or not running at all.
    pub async fn set_workflow_plan(&self, workflow_id: Uuid, request: SetPlanRequest) -> OrchestratorResult<()> {
        let plan_markdown = match (request.plan_file, request.plan_content) {
            (Some(path), None) => {
                std::fs::read_to_string(&path).map_err(|source| OrchestratorError::PlanRead { path, source })?
            }
            (None, Some(content)) => content,
            _ => return Err(OrchestratorError::InvalidPlanRequest),
        };

        let pending = match self.handles.read().await.get(&workflow_id) {
            Some(handle) => *handle.pending_node.lock().await,
            None => None,
        };
        let safe = pending.is_none() || pending == Some(GraphNode::HumanApproval);
        if !safe && !request.force {
            return Err(OrchestratorError::UnsafePlanReplacement(workflow_id));
        }

        let mut state = self.store.load_workflow(workflow_id).await?;
        state.plan_markdown = plan_markdown;
        Ok(self.store.save_workflow(&state).await?)
    }

    /// Resume every non-terminal workflow from its last checkpoint (process
    /// restart path, spec §4.F "resume"). A checkpoint whose recorded git sha
    /// no longer matches the worktree's current HEAD means something outside
    /// the orchestrator touched the repo; that workflow is failed rather than
    /// resumed against state it can no longer trust.
    pub async fn resume_incomplete_workflows(&self) -> OrchestratorResult<Vec<Uuid>> {
        let mut resumed = Vec::new();
        for state in self.store.list_workflows().await? {
            if state.workflow_status.is_terminal() {
                continue;
            }

            let current_sha = self.current_worktree_sha(&state);
            match self.store.resume_checkpoint(state.workflow_id, current_sha.as_deref()).await? {
                ResumeResult::Resumed { node } => {
                    let Some(node) = GraphNode::from_str(&node) else {
                        tracing::warn!(workflow_id = %state.workflow_id, node, "unknown checkpoint node, skipping resume");
                        continue;
                    };
                    let last_sequence = self.last_sequence(state.workflow_id).await?;
                    self.handles.write().await.insert(
                        state.workflow_id,
                        Arc::new(WorkflowHandle {
                            sequence: AtomicU64::new(last_sequence),
                            cancelled: Arc::new(AtomicBool::new(false)),
                            pending_node: Mutex::new(None),
                        }),
                    );
                    let workflow_id = state.workflow_id;
                    self.resume(workflow_id, node, state).await?;
                    resumed.push(workflow_id);
                }
                ResumeResult::Stale { expected_sha, actual_sha } => {
                    tracing::warn!(
                        workflow_id = %state.workflow_id, expected_sha, actual_sha,
                        "worktree diverged from its checkpoint, failing workflow instead of resuming"
                    );
                    let failed = state.transition_to(WorkflowStatus::Failed).unwrap_or(state);
                    self.store.save_workflow(&failed).await?;
                }
                ResumeResult::NoCheckpoint => {}
            }
        }
        Ok(resumed)
    }

    fn current_worktree_sha(&self, state: &WorkflowState) -> Option<String> {
        let path = state.worktree_path.clone()?;
        let branch = state
            .worktree_name
            .clone()
            .unwrap_or_else(|| format!("workflow/{}", state.workflow_id));
        let handle = WorktreeHandle { path: path.into(), branch, workflow_id: state.workflow_id.to_string() };
        self.git.head_commit(&handle).ok()
    }

    async fn last_sequence(&self, workflow_id: Uuid) -> OrchestratorResult<u64> {
        let events = self.store.replay_log(workflow_id, 0).await?;
        Ok(events.iter().map(|e| e.sequence).max().unwrap_or(0))
    }

    async fn take_pending(&self, workflow_id: Uuid, expected: &[GraphNode]) -> OrchestratorResult<GraphNode> {
        let handle = {
            let handles = self.handles.read().await;
            handles.get(&workflow_id).cloned().ok_or(OrchestratorError::NotFound(workflow_id))?
        };
        let mut pending = handle.pending_node.lock().await;
        let node = pending.ok_or(OrchestratorError::NotInterrupted(workflow_id))?;
        if !expected.contains(&node) {
            return Err(OrchestratorError::WrongInterrupt(workflow_id, node.to_string()));
        }
        *pending = None;
        Ok(node)
    }

    async fn resume(&self, workflow_id: Uuid, node: GraphNode, state: WorkflowState) -> OrchestratorResult<()> {
        let permit = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| OrchestratorError::AtCapacity(self.config.concurrency_cap))?;
        let this = self.clone();
        tokio::spawn(async move {
            this.drive(workflow_id, node, state, permit).await;
        });
        Ok(())
    }

    /// Drive the graph from `node` until it terminates or pauses. Holds the
    /// admission permit for the task's lifetime; a paused workflow releases
    /// it (it isn't consuming concurrency while waiting on a human) and
    /// `resume` acquires a fresh one.
    async fn drive(&self, workflow_id: Uuid, mut node: GraphNode, mut state: WorkflowState, _permit: OwnedSemaphorePermit) {
        loop {
            if self.is_cancelled(workflow_id).await {
                let cancelled = state.transition_to(WorkflowStatus::Cancelled).unwrap_or(state);
                let _ = self.finish(workflow_id, cancelled, EventType::WorkflowCancelled, None).await;
                return;
            }

            let outcome = match self.graph.step(node, state.clone()).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(%workflow_id, node = %node, %err, "graph node failed");
                    let failed = state.transition_to(WorkflowStatus::Failed).unwrap_or(state);
                    let _ = self
                        .finish(workflow_id, failed, EventType::WorkflowFailed, Some(err.to_string()))
                        .await;
                    return;
                }
            };

            match outcome {
                StepOutcome::Continue { next, state: new_state } => {
                    state = new_state;
                    if let Err(err) = self.checkpoint(workflow_id, next, &state).await {
                        tracing::error!(%workflow_id, %err, "checkpoint write failed");
                    }
                    node = next;
                }
                StepOutcome::Interrupt { node: interrupt_node, state: new_state } => {
                    state = new_state;
                    if let Err(err) = self.checkpoint(workflow_id, interrupt_node, &state).await {
                        tracing::error!(%workflow_id, %err, "checkpoint write failed");
                    }
                    if let Some(handle) = self.handles.read().await.get(&workflow_id) {
                        *handle.pending_node.lock().await = Some(interrupt_node);
                    }

                    let event_type = match interrupt_node {
                        GraphNode::BatchApproval => EventType::BatchApprovalRequested,
                        GraphNode::BlockerResolution => EventType::Blocked,
                        _ => EventType::AgentOutput,
                    };
                    let _ = self.emit(workflow_id, interrupt_node.as_str(), event_type, None).await;
                    return;
                }
                StepOutcome::Terminal { state: new_state } => {
                    let event_type = match new_state.workflow_status {
                        WorkflowStatus::Completed => EventType::WorkflowCompleted,
                        WorkflowStatus::Cancelled => EventType::WorkflowCancelled,
                        _ => EventType::WorkflowFailed,
                    };
                    let _ = self.finish(workflow_id, new_state, event_type, None).await;
                    return;
                }
            }
        }
    }

    async fn is_cancelled(&self, workflow_id: Uuid) -> bool {
        self.handles
            .read()
            .await
            .get(&workflow_id)
            .is_some_and(|h| h.cancelled.load(Ordering::SeqCst))
    }

    async fn checkpoint(&self, workflow_id: Uuid, node: GraphNode, state: &WorkflowState) -> OrchestratorResult<()> {
        self.store.save_workflow(state).await?;
        let payload = serde_json::to_value(state).map_err(StoreError::from)?;
        self.store
            .save_checkpoint(&StateCheckpoint {
                workflow_id,
                node: node.as_str().to_string(),
                state: payload,
                git_commit_sha: state.base_commit.clone(),
                written_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    async fn finish(
        &self,
        workflow_id: Uuid,
        state: WorkflowState,
        event_type: EventType,
        message: Option<String>,
    ) -> OrchestratorResult<()> {
        self.store.save_workflow(&state).await?;
        self.emit(workflow_id, "orchestrator", event_type, message).await?;
        self.handles.write().await.remove(&workflow_id);
        Ok(())
    }

    /// Assigns `sequence`, writes to the log, and publishes to the bus (B).
    async fn emit(&self, workflow_id: Uuid, agent: &str, event_type: EventType, message: Option<String>) -> OrchestratorResult<()> {
        let sequence = match self.handles.read().await.get(&workflow_id) {
            Some(handle) => handle.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            None => 0,
        };

        let mut event = WorkflowEvent::new(workflow_id, agent, event_type).with_sequence(sequence);
        if let Some(message) = message {
            event = event.with_message(message);
        }

        self.store.append_event(&event).await?;
        self.bus.publish_or_warn(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Architect, Developer, Reviewer};
    use crate::driver::{AgenticStream, Driver, DriverResult, GenerateResult};
    use crate::graph::ReviewerMode;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::process::Command;

    struct StubDriver;

    #[async_trait]
    impl Driver for StubDriver {
        async fn generate(&self, _prompt: &str, _system_prompt: Option<&str>, _schema: Option<&Value>) -> DriverResult<GenerateResult> {
            Ok(GenerateResult {
                text: r#"{"plan_markdown":"# Plan","key_files":[],"risk_level":"low"}"#.to_string(),
                usage: Default::default(),
            })
        }

        async fn execute_agentic(&self, _prompt: &str, _system_prompt: Option<&str>) -> DriverResult<AgenticStream> {
            unimplemented!("not exercised by these tests")
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    fn init_repo(dir: &std::path::Path) {
        Command::new("git").args(["init"]).current_dir(dir).output().unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(dir)
            .output()
            .unwrap();
        Command::new("git").args(["config", "user.name", "Test"]).current_dir(dir).output().unwrap();
        std::fs::write(dir.join("README.md"), "hello").unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir).output().unwrap();
        Command::new("git").args(["commit", "-m", "init"]).current_dir(dir).output().unwrap();
    }

    async fn test_orchestrator() -> (Orchestrator, tempfile::TempDir, tempfile::TempDir) {
        let repo_dir = tempfile::tempdir().unwrap();
        let wt_base = tempfile::tempdir().unwrap();
        init_repo(repo_dir.path());

        let git = Arc::new(GitIsolation::new(wt_base.path().to_path_buf(), repo_dir.path()).unwrap());
        let driver: Arc<dyn Driver> = Arc::new(StubDriver);
        let graph = Graph::new(
            Architect::new(driver.clone()),
            Developer::new(driver.clone()),
            ReviewerMode::Single(Reviewer::new(driver)),
            git.clone(),
        );

        let store = Store::connect("sqlite::memory:").await.unwrap();
        let bus = coordination::events::EventBus::shared(64);
        let config = OrchestratorConfig { concurrency_cap: 2, ..Default::default() };
        let orchestrator = Orchestrator::new(config, store, bus, git, graph);

        (orchestrator, repo_dir, wt_base)
    }

    #[tokio::test]
    async fn start_workflow_creates_a_worktree_and_persists_in_progress_state() {
        let (orchestrator, _repo, _wt) = test_orchestrator().await;
        let response = orchestrator
            .start_workflow(StartWorkflowRequest {
                issue: Issue { id: "ISSUE-1".to_string(), title: "Fix the bug".to_string(), body: "details".to_string() },
                profile: "default".to_string(),
                worktree_path: None,
            })
            .await
            .unwrap();

        let view = orchestrator.get_workflow(response.workflow_id).await.unwrap();
        assert_eq!(view.state.workflow_status, WorkflowStatus::InProgress);
        assert!(view.state.worktree_path.is_some());
    }

    #[tokio::test]
    async fn admission_control_rejects_past_concurrency_cap() {
        let (orchestrator, _repo, _wt) = test_orchestrator().await;
        for i in 0..2 {
            orchestrator
                .start_workflow(StartWorkflowRequest {
                    issue: Issue { id: format!("ISSUE-{i}"), title: "t".to_string(), body: "b".to_string() },
                    profile: "default".to_string(),
                    worktree_path: None,
                })
                .await
                .unwrap();
        }

        let result = orchestrator
            .start_workflow(StartWorkflowRequest {
                issue: Issue { id: "ISSUE-over".to_string(), title: "t".to_string(), body: "b".to_string() },
                profile: "default".to_string(),
                worktree_path: None,
            })
            .await;
        assert!(matches!(result, Err(OrchestratorError::AtCapacity(2))));
    }

    #[tokio::test]
    async fn cancel_of_unknown_workflow_is_not_found() {
        let (orchestrator, _repo, _wt) = test_orchestrator().await;
        let result = orchestrator.cancel_workflow(Uuid::new_v4(), None).await;
        assert!(matches!(result, Err(OrchestratorError::NotFound(_))));
    }

    #[tokio::test]
    async fn set_plan_rejects_both_file_and_content() {
        let (orchestrator, _repo, _wt) = test_orchestrator().await;
        let response = orchestrator
            .start_workflow(StartWorkflowRequest {
                issue: Issue { id: "ISSUE-1".to_string(), title: "t".to_string(), body: "b".to_string() },
                profile: "default".to_string(),
                worktree_path: None,
            })
            .await
            .unwrap();

        let result = orchestrator
            .set_workflow_plan(
                response.workflow_id,
                SetPlanRequest {
                    plan_file: Some("a.md".to_string()),
                    plan_content: Some("b".to_string()),
                    force: false,
                },
            )
            .await;
        assert!(matches!(result, Err(OrchestratorError::InvalidPlanRequest)));
    }
}
