//! The Oracle agent: answers a question about the codebase by bundling a
//! token-budget-capped set of matching files and driving the agent against
//! that bundle (spec §4.E), tracking the `pending → bundling → consulting →
//! completed` lifecycle folded in from `original_source/amelia/core/
//! oracle_types.py`'s `OracleConsultation`/`OracleConfig`.

use std::path::Path;
use std::sync::Arc;

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::{Driver, DriverResult};
use crate::prompts::ORACLE_PROMPT;

/// A rough, fast stand-in for a token count: ~4 characters per token,
/// matching the estimator context-bundling code uses when an exact
/// tokenizer isn't worth the dependency.
fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub glob_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_bundle_tokens: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            glob_patterns: vec!["**/*".to_string()],
            exclude_patterns: vec!["target/**".to_string(), ".git/**".to_string()],
            max_bundle_tokens: 32_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleStatus {
    Pending,
    Bundling,
    Consulting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConsultation {
    pub session_id: Uuid,
    pub problem: String,
    pub working_dir: String,
    pub status: OracleStatus,
    pub bundled_files: Vec<String>,
    pub answer: Option<String>,
}

impl OracleConsultation {
    fn new(problem: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            problem: problem.into(),
            working_dir: working_dir.into(),
            status: OracleStatus::Pending,
            bundled_files: Vec::new(),
            answer: None,
        }
    }
}

pub struct Oracle {
    driver: Arc<dyn Driver>,
    system_prompt: String,
    config: OracleConfig,
}

impl Oracle {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver, system_prompt: ORACLE_PROMPT.to_string(), config: OracleConfig::default() }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_config(mut self, config: OracleConfig) -> Self {
        self.config = config;
        self
    }

    /// Consult the oracle about `problem`, bundling files under
    /// `working_dir` that match `files` (explicit paths) or, if empty, the
    /// configured glob/exclude patterns — gitignore rules always apply.
    pub async fn consult(
        &self,
        problem: &str,
        working_dir: &str,
        files: Option<&[String]>,
    ) -> DriverResult<OracleConsultation> {
        let mut consultation = OracleConsultation::new(problem, working_dir);
        consultation.status = OracleStatus::Bundling;

        let bundle = match files {
            Some(paths) => self.bundle_explicit(working_dir, paths),
            None => self.bundle_by_pattern(working_dir),
        };
        consultation.bundled_files = bundle.iter().map(|(path, _)| path.clone()).collect();

        consultation.status = OracleStatus::Consulting;
        let context = render_bundle(&bundle);
        let prompt = format!("## Question\n{problem}\n\n## Bundled files\n{context}");
        let result = self.driver.generate(&prompt, Some(&self.system_prompt), None).await;

        match result {
            Ok(response) => {
                consultation.answer = Some(response.text);
                consultation.status = OracleStatus::Completed;
            }
            Err(err) => {
                consultation.status = OracleStatus::Failed;
                return Err(err);
            }
        }

        Ok(consultation)
    }

    fn bundle_explicit(&self, working_dir: &str, paths: &[String]) -> Vec<(String, String)> {
        let mut bundle = Vec::new();
        let mut budget = self.config.max_bundle_tokens;
        for rel_path in paths {
            let full_path = Path::new(working_dir).join(rel_path);
            if let Ok(content) = std::fs::read_to_string(&full_path) {
                let tokens = estimate_tokens(&content);
                if tokens > budget {
                    break;
                }
                budget -= tokens;
                bundle.push((rel_path.clone(), content));
            }
        }
        bundle
    }

    /// Walk `working_dir` respecting `.gitignore`, collecting files until
    /// the token budget is exhausted (spec §4.E bundling: "respecting
    /// gitignore, capped token budget").
    fn bundle_by_pattern(&self, working_dir: &str) -> Vec<(String, String)> {
        let mut bundle = Vec::new();
        let mut budget = self.config.max_bundle_tokens;

        let walker = WalkBuilder::new(working_dir).hidden(false).git_ignore(true).build();
        for entry in walker.flatten() {
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let rel_path = entry
                .path()
                .strip_prefix(working_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();

            if self.is_excluded(&rel_path) {
                continue;
            }

            let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
            let tokens = estimate_tokens(&content);
            if tokens > budget {
                continue;
            }
            budget -= tokens;
            bundle.push((rel_path, content));
        }
        bundle
    }

    fn is_excluded(&self, rel_path: &str) -> bool {
        self.config.exclude_patterns.iter().any(|pattern| {
            let prefix = pattern.trim_end_matches("/**").trim_end_matches("/*");
            rel_path.starts_with(prefix)
        })
    }
}

fn render_bundle(bundle: &[(String, String)]) -> String {
    bundle
        .iter()
        .map(|(path, content)| format!("### {path}\n```\n{content}\n```"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{AgenticStream, DriverError, GenerateResult};
    use async_trait::async_trait;
    use serde_json::Value;
    use tempfile::tempdir;

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
            unimplemented!("not exercised by oracle tests")
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    struct FailingDriver;

    #[async_trait]
    impl Driver for FailingDriver {
        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _schema: Option<&Value>,
        ) -> DriverResult<GenerateResult> {
            Err(DriverError::Transport("simulated failure".to_string()))
        }

        async fn execute_agentic(&self, _prompt: &str, _system_prompt: Option<&str>) -> DriverResult<AgenticStream> {
            unimplemented!("not exercised by oracle tests")
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn consult_bundles_explicit_files_and_completes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();

        let oracle = Oracle::new(Arc::new(StubDriver { response: "the answer".to_string() }));
        let consultation = oracle
            .consult("what does main do", dir.path().to_str().unwrap(), Some(&["a.rs".to_string()]))
            .await
            .unwrap();

        assert_eq!(consultation.status, OracleStatus::Completed);
        assert_eq!(consultation.bundled_files, vec!["a.rs".to_string()]);
        assert_eq!(consultation.answer.as_deref(), Some("the answer"));
    }

    #[tokio::test]
    async fn consult_marks_failed_on_driver_error() {
        let dir = tempdir().unwrap();
        let oracle = Oracle::new(Arc::new(FailingDriver));
        let result = oracle.consult("question", dir.path().to_str().unwrap(), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn bundle_by_pattern_respects_gitignore() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "ignored.rs\n").unwrap();
        std::fs::write(dir.path().join("ignored.rs"), "secret").unwrap();
        std::fs::write(dir.path().join("kept.rs"), "fn kept() {}").unwrap();

        let oracle = Oracle::new(Arc::new(StubDriver { response: "ok".to_string() }));
        let bundle = oracle.bundle_by_pattern(dir.path().to_str().unwrap());
        let names: Vec<&str> = bundle.iter().map(|(p, _)| p.as_str()).collect();
        assert!(names.contains(&"kept.rs"));
        assert!(!names.contains(&"ignored.rs"));
    }

    #[test]
    fn exclude_patterns_filter_by_prefix() {
        let oracle = Oracle::new(Arc::new(StubDriver { response: String::new() }));
        assert!(oracle.is_excluded("target/debug/foo"));
        assert!(!oracle.is_excluded("src/main.rs"));
    }
}
