//! Immutable workflow-state record, plan/execution records, and the
//! `workflowStatus` transition table (spec component A).

pub mod brainstorm;
pub mod profile;
pub mod types;

pub use brainstorm::{
    infer_artifact_type, Artifact, BrainstormMessage, BrainstormSession, BrainstormStatus,
    MessagePart, MessageRole,
};
pub use profile::Profile;
pub use types::{
    validate_transition, ActionType, BatchApproval, BatchResult, BatchStatus, BlockerReport,
    BlockerType, DeveloperStatus, ExecutionBatch, ExecutionPlan, GitSnapshot, IllegalTransition,
    Issue, PlanStep, PlanValidationError, ReviewResult, RiskLevel, Severity, StepResult,
    StepStatus, TokenUsage, TriState, TrustLevel, WorkflowState, WorkflowStatus,
    DEFAULT_PLAN_PATH_PATTERN,
};
