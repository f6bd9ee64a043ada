//! The Developer agent: executes one batch of plan steps, either by
//! streaming an agentic session (component D's `execute_agentic`) or, for a
//! single deterministic step, running its command directly and validating
//! the result (spec §4.F structured-mode execution) — grounded on the
//! teacher's `agents::coder` (agentic driving) merged with
//! `state_machine`'s `validate_command_result`/fallback-command retry.

use std::process::Output;
use std::sync::Arc;

use regex::Regex;

use coordination::state::{BlockerReport, BlockerType, PlanStep, StepResult, StepStatus};

use crate::contracts::parse_blocker_report;
use crate::driver::{AgenticMessage, Driver, DriverResult};
use crate::prompts::DEVELOPER_PROMPT;

/// Temperature for agentic editing: near-deterministic, matching the
/// teacher's worker-agent default (low temperature reduces spurious
/// divergence across retries of the same step).
pub const DEFAULT_DEVELOPER_TEMPERATURE: f64 = 0.05;

pub struct Developer {
    driver: Arc<dyn Driver>,
    system_prompt: String,
}

impl Developer {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver, system_prompt: DEVELOPER_PROMPT.to_string() }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Run one step's agentic edit and collect the final textual result.
    /// Returns `Ok(None)` if the stream ended without a blocker or a
    /// result message (treated by the caller as an implicit blocker).
    pub async fn execute_step_agentic(&self, step: &PlanStep, worktree_dir: &str) -> DriverResult<Option<String>> {
        use futures::StreamExt;

        let prompt = format!(
            "## Step {}\n{}\n\nWorking directory: {worktree_dir}",
            step.id, step.description
        );
        let mut stream = self.driver.execute_agentic(&prompt, Some(&self.system_prompt)).await?;

        let mut last_result = None;
        while let Some(message) = stream.next().await {
            if let AgenticMessage::Result { text } = message? {
                last_result = Some(text);
            }
        }
        Ok(last_result)
    }

    /// Execute a deterministic `command` step directly (structured mode),
    /// without invoking the driver at all — the plan step already fully
    /// specifies the action.
    pub fn execute_step_structured(&self, step: &PlanStep, cwd: &str) -> StepResult {
        let Some(command) = &step.command else {
            return StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                output: None,
                error: Some("structured step has no command".to_string()),
                executed_command: None,
                duration_seconds: 0.0,
            };
        };

        let start = std::time::Instant::now();
        let mut commands_to_try = vec![command.clone()];
        commands_to_try.extend(step.fallback_commands.iter().cloned());

        for candidate in &commands_to_try {
            let working_dir = step.cwd.as_deref().unwrap_or(cwd);
            let output = run_shell_command(candidate, working_dir);
            if let Ok(output) = output {
                if validate_command_result(&output, step) {
                    return StepResult {
                        step_id: step.id.clone(),
                        status: StepStatus::Completed,
                        output: Some(strip_ansi(&String::from_utf8_lossy(&output.stdout))),
                        error: None,
                        executed_command: Some(candidate.clone()),
                        duration_seconds: start.elapsed().as_secs_f64(),
                    };
                }
            }
        }

        StepResult {
            step_id: step.id.clone(),
            status: StepStatus::Failed,
            output: None,
            error: Some(format!("all candidate commands failed validation for step {}", step.id)),
            executed_command: commands_to_try.last().cloned(),
            duration_seconds: start.elapsed().as_secs_f64(),
        }
    }

    /// Write `step.code_change` to `step.file_path`, then run
    /// `validation_command` if one was given (spec §4.F structured-mode
    /// code-action execution).
    pub fn execute_code_step(&self, step: &PlanStep, cwd: &str) -> StepResult {
        let start = std::time::Instant::now();
        let (Some(file_path), Some(content)) = (&step.file_path, &step.code_change) else {
            return StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                output: None,
                error: Some("code step has no file_path/code_change".to_string()),
                executed_command: None,
                duration_seconds: 0.0,
            };
        };

        let target = std::path::Path::new(cwd).join(file_path);
        if let Some(parent) = target.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Failed,
                    output: None,
                    error: Some(format!("could not create parent directory for {file_path}")),
                    executed_command: None,
                    duration_seconds: start.elapsed().as_secs_f64(),
                };
            }
        }
        if let Err(err) = std::fs::write(&target, content) {
            return StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                output: None,
                error: Some(format!("failed to write {file_path}: {err}")),
                executed_command: None,
                duration_seconds: start.elapsed().as_secs_f64(),
            };
        }

        let Some(validation_command) = &step.validation_command else {
            return StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Completed,
                output: Some(format!("wrote {file_path}")),
                error: None,
                executed_command: None,
                duration_seconds: start.elapsed().as_secs_f64(),
            };
        };

        match run_shell_command(validation_command, cwd) {
            Ok(output) if validate_command_result(&output, step) => StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Completed,
                output: Some(strip_ansi(&String::from_utf8_lossy(&output.stdout))),
                error: None,
                executed_command: Some(validation_command.clone()),
                duration_seconds: start.elapsed().as_secs_f64(),
            },
            Ok(_) => StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                output: None,
                error: Some(format!("validation command did not pass for step {}", step.id)),
                executed_command: Some(validation_command.clone()),
                duration_seconds: start.elapsed().as_secs_f64(),
            },
            Err(err) => StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                output: None,
                error: Some(format!("failed to run validation command: {err}")),
                executed_command: Some(validation_command.clone()),
                duration_seconds: start.elapsed().as_secs_f64(),
            },
        }
    }

    /// Dispatch a step's structured (non-agentic) execution by its action
    /// type (spec §4.F `_execute_step_with_fallbacks`).
    pub fn execute_step(&self, step: &PlanStep, cwd: &str) -> StepResult {
        match step.action_type {
            coordination::state::ActionType::Code => self.execute_code_step(step, cwd),
            coordination::state::ActionType::Command | coordination::state::ActionType::Validation => {
                self.execute_step_structured(step, cwd)
            }
        }
    }

    /// Parse a raised blocker, fail-closed.
    pub fn parse_blocker(&self, raw: &str, step_id: &str) -> BlockerReport {
        parse_blocker_report(raw, step_id)
    }
}

fn run_shell_command(command: &str, cwd: &str) -> std::io::Result<Output> {
    std::process::Command::new("sh").arg("-c").arg(command).current_dir(cwd).output()
}

/// Strip ANSI escape codes before matching `expected_output_pattern`
/// (spec §4.F: command output may be colorized by the tool being run).
fn strip_ansi(input: &str) -> String {
    let ansi = Regex::new(r"\x1b\[[0-9;]*m").expect("static regex is valid");
    ansi.replace_all(input, "").into_owned()
}

/// Validate a command's result against the step's expectations: exit code
/// must match, and if an output pattern is set, the (ANSI-stripped) stdout
/// must match it (spec §4.F `validate_command_result`).
fn validate_command_result(output: &Output, step: &PlanStep) -> bool {
    let exit_code = output.status.code().unwrap_or(-1);
    if exit_code != step.expect_exit_code {
        return false;
    }
    if let Some(pattern) = &step.expected_output_pattern {
        let Ok(regex) = Regex::new(pattern) else { return false };
        let stdout = strip_ansi(&String::from_utf8_lossy(&output.stdout));
        return regex.is_match(&stdout);
    }
    true
}

/// Given a failed step, compute the ids of downstream steps that must be
/// skipped because they depend (directly or transitively) on it (spec
/// §8 Scenario 2's cascade-skip map).
pub fn get_cascade_skips(failed_step_id: &str, all_steps: &[PlanStep]) -> Vec<(String, String)> {
    let mut reasons: Vec<(String, String)> = Vec::new();
    let mut frontier = vec![failed_step_id.to_string()];
    let mut seen = std::collections::HashSet::new();
    seen.insert(failed_step_id.to_string());

    while let Some(current) = frontier.pop() {
        for step in all_steps {
            if step.depends_on.contains(&current) && seen.insert(step.id.clone()) {
                let reason = if current == failed_step_id {
                    format!("depends on {failed_step_id}")
                } else {
                    format!("depends on {current} \u{2192} {failed_step_id}")
                };
                reasons.push((step.id.clone(), reason));
                frontier.push(step.id.clone());
            }
        }
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::state::ActionType;

    fn step(id: &str, deps: Vec<&str>) -> PlanStep {
        PlanStep::new(id, format!("step {id}"), ActionType::Code)
            .with_depends_on(deps.into_iter().map(String::from).collect())
    }

    #[test]
    fn cascade_skip_follows_transitive_dependents() {
        let steps = vec![step("A", vec![]), step("B", vec!["A"]), step("C", vec!["B"])];
        let skips = get_cascade_skips("A", &steps);
        let ids: Vec<&str> = skips.iter().map(|(id, _)| id.as_str()).collect();
        assert!(ids.contains(&"B"));
        assert!(ids.contains(&"C"));
    }

    #[test]
    fn cascade_skip_is_empty_for_leaf_failure() {
        let steps = vec![step("A", vec![]), step("B", vec!["A"])];
        let skips = get_cascade_skips("B", &steps);
        assert!(skips.is_empty());
    }

    #[test]
    fn validate_command_result_checks_exit_code() {
        let mut step = PlanStep::new("s1", "run", ActionType::Command);
        step.expect_exit_code = 0;
        let output = Output {
            status: exit_status(1),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert!(!validate_command_result(&output, &step));
    }

    #[test]
    fn validate_command_result_checks_output_pattern() {
        let mut step = PlanStep::new("s1", "run", ActionType::Command);
        step.expect_exit_code = 0;
        step.expected_output_pattern = Some("test result: ok".to_string());
        let output = Output {
            status: exit_status(0),
            stdout: b"test result: ok. 3 passed".to_vec(),
            stderr: Vec::new(),
        };
        assert!(validate_command_result(&output, &step));
    }

    #[cfg(unix)]
    fn exit_status(code: i32) -> std::process::ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code << 8)
    }

    struct StubDriver;

    #[async_trait::async_trait]
    impl Driver for StubDriver {
        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _schema: Option<&serde_json::Value>,
        ) -> DriverResult<crate::driver::GenerateResult> {
            unimplemented!("not exercised by structured-execution tests")
        }

        async fn execute_agentic(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
        ) -> DriverResult<crate::driver::AgenticStream> {
            unimplemented!("not exercised by structured-execution tests")
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    #[test]
    fn execute_code_step_writes_file_and_runs_validation() {
        let dir = tempfile::tempdir().unwrap();
        let developer = Developer::new(Arc::new(StubDriver));

        let mut step = PlanStep::new("s1", "add greeting", ActionType::Code);
        step.file_path = Some("src/greeting.txt".to_string());
        step.code_change = Some("hello".to_string());
        step.validation_command = Some("test -f src/greeting.txt".to_string());

        let result = developer.execute_code_step(&step, dir.path().to_str().unwrap());
        assert_eq!(result.status, StepStatus::Completed);
        assert!(dir.path().join("src/greeting.txt").exists());
    }

    #[test]
    fn execute_code_step_fails_without_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let developer = Developer::new(Arc::new(StubDriver));
        let step = PlanStep::new("s1", "bad step", ActionType::Code);
        let result = developer.execute_code_step(&step, dir.path().to_str().unwrap());
        assert_eq!(result.status, StepStatus::Failed);
    }
}
