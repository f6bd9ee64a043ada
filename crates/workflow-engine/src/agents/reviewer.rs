//! The Reviewer agent: judges a completed batch's diff against the plan
//! steps it claims to satisfy, either as a single persona or as a
//! competitive panel of personas whose verdicts are ANDed together (spec
//! §4.E, §8 Scenario 4) — grounded on `agents::reviewer`'s builder
//! pattern.

use std::sync::Arc;

use schemars::schema_for;

use coordination::state::ReviewResult;

use crate::contracts::{aggregate_reviews, parse_review_result, ReviewerResponse};
use crate::driver::{Driver, DriverError, DriverResult};
use crate::prompts::REVIEWER_PROMPT;

/// Reviewing benefits from a little more latitude than plan drafting: a
/// reviewer restating the diff back verbatim at temperature 0 tends to
/// rubber-stamp rather than critique.
pub const DEFAULT_REVIEWER_TEMPERATURE: f64 = 0.2;

pub struct Reviewer {
    driver: Arc<dyn Driver>,
    persona: String,
    system_prompt: String,
}

impl Reviewer {
    /// A reviewer with the default persona ("general").
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_persona(driver, "general")
    }

    pub fn with_persona(driver: Arc<dyn Driver>, persona: impl Into<String>) -> Self {
        Self { driver, persona: persona.into(), system_prompt: REVIEWER_PROMPT.to_string() }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Review a batch's diff against the step descriptions it claims to
    /// satisfy, from this reviewer's single persona.
    pub async fn review_batch(&self, diff: &str, step_descriptions: &[String]) -> DriverResult<ReviewResult> {
        let response = self.generate_response(diff, step_descriptions).await?;
        Ok(parse_review_result(&response, &self.persona))
    }

    async fn generate_response(&self, diff: &str, step_descriptions: &[String]) -> DriverResult<String> {
        let schema = schema_for!(ReviewerResponse);
        let schema_value = serde_json::to_value(&schema)
            .map_err(|e| DriverError::MalformedOutput(format!("failed to serialize schema: {e}")))?;

        let steps = step_descriptions.join("\n- ");
        let prompt = format!("## Plan steps under review\n- {steps}\n\n## Diff\n{diff}");
        let result = self.driver.generate(&prompt, Some(&self.system_prompt), Some(&schema_value)).await?;
        Ok(result.text)
    }
}

/// Run `reviewers` concurrently over the same diff and fold their verdicts
/// into one (spec §8 Scenario 4): approved only if every persona approved.
pub async fn competitive_review(
    reviewers: &[Reviewer],
    diff: &str,
    step_descriptions: &[String],
) -> DriverResult<ReviewResult> {
    let mut futures = Vec::with_capacity(reviewers.len());
    for reviewer in reviewers {
        futures.push(async move {
            let raw = reviewer.generate_response(diff, step_descriptions).await?;
            let parsed: Option<ReviewerResponse> = serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .and_then(|v| serde_json::from_value(v).ok());
            let response = parsed.unwrap_or(ReviewerResponse {
                approved: false,
                comments: vec!["reviewer output could not be parsed; rejecting for safety".to_string()],
                severity: coordination::state::Severity::High,
            });
            DriverResult::Ok((reviewer.persona.clone(), response))
        });
    }

    let results = futures::future::try_join_all(futures).await?;
    Ok(aggregate_reviews(&results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{AgenticStream, GenerateResult};
    use async_trait::async_trait;
    use coordination::state::Severity;
    use serde_json::Value;

    struct StubDriver {
        response: String,
    }

    #[async_trait]
    impl Driver for StubDriver {
        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _schema: Option<&Value>,
        ) -> DriverResult<GenerateResult> {
            Ok(GenerateResult { text: self.response.clone(), usage: Default::default() })
        }

        async fn execute_agentic(&self, _prompt: &str, _system_prompt: Option<&str>) -> DriverResult<AgenticStream> {
            unimplemented!("not exercised by reviewer tests")
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn single_persona_review_parses_approval() {
        let driver = Arc::new(StubDriver {
            response: r#"{"approved":true,"comments":[],"severity":"low"}"#.to_string(),
        });
        let reviewer = Reviewer::with_persona(driver, "security");
        let result = reviewer.review_batch("diff", &["step 1".to_string()]).await.unwrap();
        assert!(result.approved);
        assert_eq!(result.reviewer_persona, "security");
    }

    #[tokio::test]
    async fn competitive_review_rejects_if_any_persona_rejects() {
        let approving = Arc::new(StubDriver {
            response: r#"{"approved":true,"comments":["fine"],"severity":"low"}"#.to_string(),
        });
        let rejecting = Arc::new(StubDriver {
            response: r#"{"approved":false,"comments":["missing test"],"severity":"medium"}"#.to_string(),
        });
        let reviewers = vec![
            Reviewer::with_persona(approving, "security"),
            Reviewer::with_persona(rejecting, "testing"),
        ];
        let result = competitive_review(&reviewers, "diff", &["step 1".to_string()]).await.unwrap();
        assert!(!result.approved);
        assert_eq!(result.severity, Severity::Medium);
        assert!(result.comments.iter().any(|c| c.starts_with("[testing]")));
    }
}
