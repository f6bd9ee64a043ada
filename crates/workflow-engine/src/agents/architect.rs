//! The Architect agent: turns an issue description into an execution plan
//! (spec §4.E), grounded on `agents::coder`'s builder pattern (env-tunable
//! generation parameters, a documented default temperature).

use std::sync::Arc;

use schemars::schema_for;

use crate::contracts::{parse_architect_plan, ArchitectPlanResponse};
use crate::driver::{Driver, DriverError, DriverResult};
use crate::prompts::ARCHITECT_PROMPT;

/// Low temperature: plan drafting benefits from determinism over
/// creativity — the same issue description should produce materially the
/// same plan shape across retries.
pub const DEFAULT_ARCHITECT_TEMPERATURE: f64 = 0.1;

pub struct Architect {
    driver: Arc<dyn Driver>,
    system_prompt: String,
}

impl Architect {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver, system_prompt: ARCHITECT_PROMPT.to_string() }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// The underlying driver, for callers (the graph runtime's plan
    /// validator) that need a raw `generate` call outside the Architect's
    /// own prompt/parse contract.
    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::clone(&self.driver)
    }

    /// Draft a plan for `goal`, given the repository's key files rendered
    /// as a single context blob.
    pub async fn draft_plan(&self, goal: &str, context: &str) -> DriverResult<ArchitectPlanResponse> {
        let schema = schema_for!(ArchitectPlanResponse);
        let schema_value = serde_json::to_value(&schema)
            .map_err(|e| DriverError::MalformedOutput(format!("failed to serialize schema: {e}")))?;

        let prompt = format!("## Goal\n{goal}\n\n## Repository context\n{context}");
        let result = self
            .driver
            .generate(&prompt, Some(&self.system_prompt), Some(&schema_value))
            .await?;

        Ok(parse_architect_plan(&result.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{AgenticStream, GenerateResult};
    use async_trait::async_trait;
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
            unimplemented!("not exercised by architect tests")
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn draft_plan_parses_well_formed_response() {
        let driver = Arc::new(StubDriver {
            response: r#"{"plan_markdown":"# Plan\n1. Do the thing","key_files":["src/lib.rs"],"risk_level":"medium"}"#
                .to_string(),
        });
        let architect = Architect::new(driver);
        let plan = architect.draft_plan("add a feature", "src/lib.rs contents...").await.unwrap();
        assert_eq!(plan.key_files, vec!["src/lib.rs".to_string()]);
        assert_eq!(plan.risk_level, coordination::state::RiskLevel::Medium);
    }

    #[tokio::test]
    async fn draft_plan_degrades_on_malformed_response() {
        let driver = Arc::new(StubDriver { response: "not json at all".to_string() });
        let architect = Architect::new(driver);
        let plan = architect.draft_plan("add a feature", "").await.unwrap();
        assert_eq!(plan.risk_level, coordination::state::RiskLevel::High);
    }
}
