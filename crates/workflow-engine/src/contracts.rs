//! Fail-closed parsing of driver output into the typed records
//! `coordination::state` defines (spec §4.E), grounded on
//! `contracts::SpecialistResponse`'s/`ObjectiveStatus`'s pattern: a malformed or
//! missing field never panics and never silently succeeds — it degrades to
//! the most conservative outcome (a high-severity blocker or a rejected
//! review), forcing a human into the loop rather than letting a broken
//! agent response slide through unreviewed.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use coordination::state::{BlockerReport, BlockerType, ExecutionPlan, ReviewResult, RiskLevel, Severity};

/// Schema-validated shape the Architect must return when drafting a plan
/// (spec §4.E). Mirrors `plan_markdown`/`key_files`/`risk_level` in
/// `WorkflowState`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArchitectPlanResponse {
    pub plan_markdown: String,
    pub key_files: Vec<String>,
    pub risk_level: RiskLevel,
}

/// Schema-validated shape one reviewer persona must return (spec §4.E).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReviewerResponse {
    pub approved: bool,
    pub comments: Vec<String>,
    pub severity: Severity,
}

/// Schema-validated shape for a Developer-raised blocker (spec §4.E).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BlockerResponse {
    pub step_id: String,
    pub step_description: String,
    pub blocker_type: BlockerType,
    pub error_message: String,
    #[serde(default)]
    pub attempted_actions: Vec<String>,
    #[serde(default)]
    pub suggested_resolutions: Vec<String>,
}

/// Parse raw driver JSON into an [`ArchitectPlanResponse`], degrading to a
/// maximally-cautious plan description on malformed input rather than
/// propagating a parse error into the graph.
pub fn parse_architect_plan(raw: &str) -> ArchitectPlanResponse {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_else(|| ArchitectPlanResponse {
            plan_markdown: String::new(),
            key_files: Vec::new(),
            risk_level: RiskLevel::High,
        })
}

/// Parse raw driver JSON into a single-persona [`ReviewResult`]. Fail-closed:
/// a response that does not parse is treated as a rejection at `High`
/// severity, exactly as `contracts` treats an unparseable specialist
/// response as `ObjectiveStatus::Failed`.
pub fn parse_review_result(raw: &str, reviewer_persona: &str) -> ReviewResult {
    let parsed: Option<ReviewerResponse> = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| serde_json::from_value(v).ok());

    match parsed {
        Some(response) => ReviewResult {
            reviewer_persona: reviewer_persona.to_string(),
            approved: response.approved,
            comments: response.comments,
            severity: response.severity,
        },
        None => ReviewResult {
            reviewer_persona: reviewer_persona.to_string(),
            approved: false,
            comments: vec!["reviewer output could not be parsed; rejecting for safety".to_string()],
            severity: Severity::High,
        },
    }
}

/// Parse raw driver JSON into a [`BlockerReport`]. Fail-closed: an
/// unparseable blocker report is still surfaced to the blocker-resolution
/// node as `UnexpectedState` rather than being dropped, so a human still
/// sees it.
pub fn parse_blocker_report(raw: &str, step_id: &str) -> BlockerReport {
    let parsed: Option<BlockerResponse> = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| serde_json::from_value(v).ok());

    match parsed {
        Some(response) => BlockerReport {
            step_id: response.step_id,
            step_description: response.step_description,
            blocker_type: response.blocker_type,
            error_message: response.error_message,
            attempted_actions: response.attempted_actions,
            suggested_resolutions: response.suggested_resolutions,
        },
        None => BlockerReport {
            step_id: step_id.to_string(),
            step_description: String::new(),
            blocker_type: BlockerType::UnexpectedState,
            error_message: format!("developer raised a blocker that could not be parsed: {raw}"),
            attempted_actions: Vec::new(),
            suggested_resolutions: Vec::new(),
        },
    }
}

/// Parse raw driver JSON into a structured [`ExecutionPlan`] (spec §4.F
/// `plan_validator_node`). Fail-closed: a plan that does not parse degrades
/// to an empty-batches plan, which `ExecutionPlan::validate_dependencies`
/// trivially accepts but which carries no work — the graph runtime then has
/// nothing to execute and the workflow surfaces as a no-op rather than a
/// crash.
pub fn parse_execution_plan(raw: &str, goal: &str) -> ExecutionPlan {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_else(|| ExecutionPlan { goal: goal.to_string(), batches: Vec::new(), total_estimated_minutes: None })
}

/// Aggregate N reviewer verdicts into one (spec §8 Scenario 4 — competitive
/// multi-persona review): approved only if every persona approved, overall
/// severity is the max across personas, and every persona's comments are
/// kept, prefixed with its name.
pub fn aggregate_reviews(personas: &[(String, ReviewerResponse)]) -> ReviewResult {
    let approved = personas.iter().all(|(_, r)| r.approved);
    let severity = personas
        .iter()
        .map(|(_, r)| r.severity)
        .max()
        .unwrap_or(Severity::Low);
    let comments = personas
        .iter()
        .flat_map(|(name, r)| r.comments.iter().map(move |c| format!("[{name}] {c}")))
        .collect();
    let reviewer_persona = personas.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join("+");

    ReviewResult { reviewer_persona, approved, comments, severity }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_architect_plan_degrades_to_high_risk() {
        let plan = parse_architect_plan("not json");
        assert_eq!(plan.risk_level, RiskLevel::High);
        assert!(plan.key_files.is_empty());
    }

    #[test]
    fn well_formed_architect_plan_parses() {
        let raw = r#"{"plan_markdown":"# Plan","key_files":["src/lib.rs"],"risk_level":"low"}"#;
        let plan = parse_architect_plan(raw);
        assert_eq!(plan.plan_markdown, "# Plan");
        assert_eq!(plan.risk_level, RiskLevel::Low);
    }

    #[test]
    fn malformed_review_is_rejected_at_high_severity() {
        let review = parse_review_result("{garbage", "security");
        assert!(!review.approved);
        assert_eq!(review.severity, Severity::High);
    }

    #[test]
    fn malformed_blocker_becomes_unexpected_state() {
        let blocker = parse_blocker_report("nonsense", "step-1");
        assert_eq!(blocker.blocker_type, BlockerType::UnexpectedState);
        assert_eq!(blocker.step_id, "step-1");
    }

    #[test]
    fn malformed_execution_plan_degrades_to_empty_batches() {
        let plan = parse_execution_plan("not json", "fix the bug");
        assert_eq!(plan.goal, "fix the bug");
        assert!(plan.batches.is_empty());
    }

    #[test]
    fn aggregate_reviews_requires_unanimous_approval() {
        let personas = vec![
            (
                "security".to_string(),
                ReviewerResponse { approved: true, comments: vec!["looks fine".to_string()], severity: Severity::Low },
            ),
            (
                "performance".to_string(),
                ReviewerResponse {
                    approved: false,
                    comments: vec!["N+1 query".to_string()],
                    severity: Severity::Medium,
                },
            ),
        ];
        let result = aggregate_reviews(&personas);
        assert!(!result.approved);
        assert_eq!(result.severity, Severity::Medium);
        assert!(result.comments.iter().any(|c| c.starts_with("[performance]")));
    }
}
