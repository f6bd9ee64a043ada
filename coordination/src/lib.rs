//! Coordination layer for the agent workflow orchestrator.
//!
//! Owns the leaf concerns the orchestration engine is built on:
//! - [`state`]: the immutable `WorkflowState` record, plan/execution records, and the
//!   `workflowStatus` transition table.
//! - [`events`]: the typed `WorkflowEvent` log entry and an in-memory pub/sub bus.
//! - [`persistence`]: a relational store (embedded SQLite or server Postgres) with
//!   schema migrations and a graph checkpointer.
//! - [`git`]: per-workflow worktree isolation and commit-level checkpoint/rollback.

#![allow(clippy::uninlined_format_args)]

pub mod events;
pub mod git;
pub mod persistence;
pub mod state;

pub use events::{EventBus, EventBusError, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus, WorkflowEvent, EventType};
pub use git::{GitError, GitIsolation, GitResult, WorktreeHandle};
pub use persistence::{Store, StoreError, StoreResult, StoreBackend};
pub use state::{
    infer_artifact_type, Artifact, BatchResult, BlockerReport, BlockerType, BrainstormMessage,
    BrainstormSession, BrainstormStatus, DeveloperStatus, ExecutionBatch, ExecutionPlan,
    GitSnapshot, MessagePart, MessageRole, PlanStep, Profile, ReviewResult, RiskLevel, Severity,
    StepResult, StepStatus, TokenUsage, TriState, TrustLevel, WorkflowState, WorkflowStatus,
    DEFAULT_PLAN_PATH_PATTERN,
};
