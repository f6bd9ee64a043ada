//! Brainstorm subsystem (spec component I): a long-lived chat session that
//! can hand off to a fresh workflow once it produces an artifact.
//!
//! Grounded on `coordination::harness::session`'s session-lifecycle shape
//! (status enum, structured persistence) generalized from iteration
//! tracking to chat, and on
//! `original_source/amelia/server/routes/brainstorm.py` +
//! `amelia/server/database/brainstorm_repository.py` for the
//! session/message/artifact relationship and the `write_file` ->
//! artifact-type inference heuristic.
//!
//! The `Driver` trait (component D) has no session-resumption parameter, so
//! multi-turn continuity is emulated here by replaying the session's full
//! message transcript as the prompt on every turn rather than by threading
//! a driver-native session id through `execute_agentic`. `driver_session_id`
//! is still recorded on the session record for drivers that do support
//! native continuity in the future; today it is set once, to the session's
//! own id, and never consulted.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use uuid::Uuid;

use coordination::events::{EventBusExt, EventType, SharedEventBus, WorkflowEvent};
use coordination::persistence::{Store, StoreError};
use coordination::state::{
    infer_artifact_type, Artifact, BrainstormMessage, BrainstormSession, BrainstormStatus, Issue,
    MessagePart, MessageRole,
};

use crate::driver::{AgenticMessage, Driver, DriverError};
use crate::orchestrator::{Orchestrator, OrchestratorError, StartWorkflowRequest, StartWorkflowResponse};
use crate::prompts::BRAINSTORM_PROMPT;

#[derive(Debug, Error)]
pub enum BrainstormError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("brainstorm session {0} not found")]
    NotFound(Uuid),
    #[error("brainstorm session {0} is {1} and cannot accept new messages")]
    SessionClosed(Uuid, BrainstormStatus),
    #[error("artifact at path `{0}` was never produced by session {1}")]
    UnknownArtifact(String, Uuid),
}

pub type BrainstormResult<T> = Result<T, BrainstormError>;

/// Outcome of one `send_message` turn: the assistant's reply plus any
/// artifact the turn produced.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub message: BrainstormMessage,
    pub artifacts: Vec<Artifact>,
}

/// Owns the brainstorm subsystem's Store/bus/driver wiring and the
/// [`Orchestrator`] handle used to mint a workflow on handoff.
#[derive(Clone)]
pub struct BrainstormService {
    store: Store,
    bus: SharedEventBus,
    driver: Arc<dyn Driver>,
    orchestrator: Orchestrator,
}

impl BrainstormService {
    pub fn new(store: Store, bus: SharedEventBus, driver: Arc<dyn Driver>, orchestrator: Orchestrator) -> Self {
        Self { store, bus, driver, orchestrator }
    }

    pub async fn create_session(&self, profile_id: impl Into<String>, topic: Option<String>) -> BrainstormResult<BrainstormSession> {
        let mut session = BrainstormSession::new(profile_id, topic);
        session.driver_session_id = Some(session.id.to_string());
        self.store.create_brainstorm_session(&session).await?;

        let event = WorkflowEvent::new(session.id, "brainstorm", EventType::BrainstormSessionCreated);
        self.bus.publish_or_warn(event);
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> BrainstormResult<BrainstormSession> {
        self.store
            .get_brainstorm_session(session_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(id) => BrainstormError::NotFound(id),
                other => BrainstormError::Store(other),
            })
    }

    pub async fn list_sessions(&self, profile_id: Option<&str>) -> BrainstormResult<Vec<BrainstormSession>> {
        Ok(self.store.list_brainstorm_sessions(profile_id).await?)
    }

    pub async fn messages(&self, session_id: Uuid) -> BrainstormResult<Vec<BrainstormMessage>> {
        Ok(self.store.get_brainstorm_messages(session_id).await?)
    }

    pub async fn artifacts(&self, session_id: Uuid) -> BrainstormResult<Vec<Artifact>> {
        Ok(self.store.get_brainstorm_artifacts(session_id).await?)
    }

    /// Append the user's message, run one agentic turn, and persist the
    /// assistant's reply plus any artifacts it produced (spec §4.I / §8
    /// Scenario 6).
    pub async fn send_message(&self, session_id: Uuid, content: impl Into<String>) -> BrainstormResult<TurnResult> {
        let session = self.get_session(session_id).await?;
        if matches!(session.status, BrainstormStatus::Completed | BrainstormStatus::Failed) {
            return Err(BrainstormError::SessionClosed(session_id, session.status));
        }

        let content = content.into();
        let history = self.store.get_brainstorm_messages(session_id).await?;
        let user_sequence = self.store.next_brainstorm_sequence(session_id).await?;
        let user_message = BrainstormMessage {
            id: Uuid::new_v4(),
            session_id,
            sequence: user_sequence,
            role: MessageRole::User,
            content: content.clone(),
            parts: vec![MessagePart::Text { text: content.clone() }],
            created_at: chrono::Utc::now(),
        };
        self.store.save_brainstorm_message(&user_message).await?;

        let prompt = render_transcript(&history, &content);
        let mut stream = self.driver.execute_agentic(&prompt, Some(BRAINSTORM_PROMPT)).await?;

        let mut parts = Vec::new();
        let mut text = String::new();
        let mut artifacts = Vec::new();

        while let Some(message) = stream.next().await {
            let message = message?;
            if let Some(event_type) = message.event_type() {
                let mut event = WorkflowEvent::new(session_id, "brainstorm", event_type);
                if let AgenticMessage::ToolCall { tool_name, tool_input, .. } = &message {
                    event.tool_name = Some(tool_name.clone());
                    event.tool_input = Some(tool_input.clone());
                }
                self.bus.publish_or_warn(event);
            }

            match message {
                AgenticMessage::Result { text: result_text } => {
                    text = result_text.clone();
                    parts.push(MessagePart::Text { text: result_text });
                }
                AgenticMessage::ToolCall { tool_name, tool_input, tool_use_id } => {
                    parts.push(MessagePart::ToolCall {
                        tool_call_id: tool_use_id,
                        tool_name: tool_name.clone(),
                        args: tool_input.clone(),
                    });
                    if tool_name == "write_file" {
                        if let Some(path) = tool_input.get("path").and_then(|v| v.as_str()) {
                            artifacts.push(self.record_artifact(session_id, path).await?);
                        }
                    }
                }
                AgenticMessage::ToolResult { tool_use_id, output, .. } => {
                    parts.push(MessagePart::ToolResult { tool_call_id: tool_use_id, result: output });
                }
                AgenticMessage::Thinking { text } => {
                    parts.push(MessagePart::Reasoning { text });
                }
                AgenticMessage::Usage { .. } => {}
            }
        }

        let assistant_sequence = self.store.next_brainstorm_sequence(session_id).await?;
        let assistant_message = BrainstormMessage {
            id: Uuid::new_v4(),
            session_id,
            sequence: assistant_sequence,
            role: MessageRole::Assistant,
            content: text,
            parts,
            created_at: chrono::Utc::now(),
        };
        self.store.save_brainstorm_message(&assistant_message).await?;
        self.bus
            .publish_or_warn(WorkflowEvent::new(session_id, "brainstorm", EventType::BrainstormMessageComplete));

        if !artifacts.is_empty() {
            let mut session = session;
            session.status = BrainstormStatus::ReadyForHandoff;
            self.store.update_brainstorm_session(&session).await?;
        }

        Ok(TurnResult { message: assistant_message, artifacts })
    }

    async fn record_artifact(&self, session_id: Uuid, path: &str) -> BrainstormResult<Artifact> {
        let artifact = Artifact {
            id: Uuid::new_v4(),
            session_id,
            artifact_type: infer_artifact_type(path),
            path: path.to_string(),
            title: None,
            created_at: chrono::Utc::now(),
        };
        self.store.save_brainstorm_artifact(&artifact).await?;
        let event = WorkflowEvent::new(session_id, "brainstorm", EventType::BrainstormArtifactCreated)
            .with_message(path.to_string());
        self.bus.publish_or_warn(event);
        Ok(artifact)
    }

    /// Validate the artifact exists, read its content, mark the session
    /// `completed`, and mint a new workflow seeded from that content (spec
    /// §4.I / §8 Scenario 6).
    pub async fn handoff_to_implementation(
        &self,
        session_id: Uuid,
        artifact_path: &str,
        profile: impl Into<String>,
    ) -> BrainstormResult<StartWorkflowResponse> {
        let mut session = self.get_session(session_id).await?;
        let artifacts = self.store.get_brainstorm_artifacts(session_id).await?;
        let artifact = artifacts
            .into_iter()
            .find(|a| a.path == artifact_path)
            .ok_or_else(|| BrainstormError::UnknownArtifact(artifact_path.to_string(), session_id))?;

        let body = std::fs::read_to_string(&artifact.path).unwrap_or_else(|_| {
            format!("Implement the design handed off from brainstorm session {session_id}, artifact `{}`.", artifact.path)
        });
        let issue = Issue {
            id: format!("brainstorm-{session_id}"),
            title: artifact.title.clone().unwrap_or_else(|| artifact.path.clone()),
            body,
        };

        let response = self
            .orchestrator
            .start_workflow(StartWorkflowRequest { issue, profile: profile.into(), worktree_path: None })
            .await?;

        session.status = BrainstormStatus::Completed;
        self.store.update_brainstorm_session(&session).await?;

        Ok(response)
    }
}

/// Flatten prior turns and the new user message into one prompt, since the
/// driver interface has no native multi-turn session concept.
fn render_transcript(history: &[BrainstormMessage], new_user_message: &str) -> String {
    let mut out = String::new();
    for message in history {
        let role = match message.role {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
        };
        out.push_str(&format!("{role}: {}\n\n", message.content));
    }
    out.push_str(&format!("User: {new_user_message}\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Architect, Developer, Reviewer};
    use crate::config::OrchestratorConfig;
    use crate::driver::{AgenticStream, DriverResult, GenerateResult};
    use crate::graph::{Graph, ReviewerMode};
    use async_trait::async_trait;
    use coordination::events::EventBus;
    use coordination::git::GitIsolation;
    use serde_json::Value;
    use std::process::Command;

    struct StubDriver {
        messages: Vec<AgenticMessage>,
    }

    #[async_trait]
    impl Driver for StubDriver {
        async fn generate(&self, _p: &str, _s: Option<&str>, _schema: Option<&Value>) -> DriverResult<GenerateResult> {
            Ok(GenerateResult { text: String::new(), usage: Default::default() })
        }

        async fn execute_agentic(&self, _prompt: &str, _system_prompt: Option<&str>) -> DriverResult<AgenticStream> {
            let messages = self.messages.clone();
            let results: Vec<DriverResult<AgenticMessage>> = messages.into_iter().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(results)))
        }

        fn model(&self) -> &str {
            "stub-brainstorm"
        }
    }

    fn init_repo(dir: &std::path::Path) {
        Command::new("git").args(["init"]).current_dir(dir).output().unwrap();
        Command::new("git").args(["config", "user.email", "test@example.com"]).current_dir(dir).output().unwrap();
        Command::new("git").args(["config", "user.name", "Test"]).current_dir(dir).output().unwrap();
        std::fs::write(dir.join("README.md"), "hello").unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir).output().unwrap();
        Command::new("git").args(["commit", "-m", "init"]).current_dir(dir).output().unwrap();
    }

    async fn test_service(messages: Vec<AgenticMessage>) -> (BrainstormService, tempfile::TempDir, tempfile::TempDir) {
        let repo_dir = tempfile::tempdir().unwrap();
        let wt_base = tempfile::tempdir().unwrap();
        init_repo(repo_dir.path());

        let store = Store::connect("sqlite::memory:").await.unwrap();
        let bus = EventBus::shared(64);
        let git = Arc::new(GitIsolation::new(wt_base.path().to_path_buf(), repo_dir.path()).unwrap());
        let driver: Arc<dyn Driver> = Arc::new(StubDriver { messages });
        let graph = Graph::new(
            Architect::new(driver.clone()),
            Developer::new(driver.clone()),
            ReviewerMode::Single(Reviewer::new(driver.clone())),
            git.clone(),
        );
        let orchestrator = Orchestrator::new(OrchestratorConfig::default(), store.clone(), bus.clone(), git, graph);
        (BrainstormService::new(store, bus, driver, orchestrator), repo_dir, wt_base)
    }

    #[tokio::test]
    async fn create_session_starts_active() {
        let (service, _repo, _wt_base) = test_service(vec![]).await;
        let session = service.create_session("profile-1", Some("caching".to_string())).await.unwrap();
        assert_eq!(session.status, BrainstormStatus::Active);
    }

    #[tokio::test]
    async fn send_message_without_write_file_leaves_session_active() {
        let (service, _repo, _wt_base) = test_service(vec![
            AgenticMessage::Result { text: "let's think about caching layers".to_string() },
            AgenticMessage::Usage { usage: Default::default() },
        ])
        .await;
        let session = service.create_session("profile-1", None).await.unwrap();
        let turn = service.send_message(session.id, "what should we cache?").await.unwrap();
        assert!(turn.artifacts.is_empty());

        let reloaded = service.get_session(session.id).await.unwrap();
        assert_eq!(reloaded.status, BrainstormStatus::Active);
    }

    #[tokio::test]
    async fn write_file_tool_call_creates_a_design_artifact_and_marks_ready() {
        let (service, _repo, _wt_base) = test_service(vec![
            AgenticMessage::ToolCall {
                tool_name: "write_file".to_string(),
                tool_input: serde_json::json!({"path": "docs/plans/2026-01-18-cache-design.md"}),
                tool_use_id: "tu_1".to_string(),
            },
            AgenticMessage::ToolResult { tool_use_id: "tu_1".to_string(), output: "written".to_string(), is_error: false },
            AgenticMessage::Result { text: "design written".to_string() },
            AgenticMessage::Usage { usage: Default::default() },
        ])
        .await;
        let session = service.create_session("profile-1", None).await.unwrap();
        let turn = service.send_message(session.id, "write up the design").await.unwrap();

        assert_eq!(turn.artifacts.len(), 1);
        assert_eq!(turn.artifacts[0].artifact_type, "design");

        let reloaded = service.get_session(session.id).await.unwrap();
        assert_eq!(reloaded.status, BrainstormStatus::ReadyForHandoff);
    }

    #[tokio::test]
    async fn handoff_rejects_unknown_artifact_path() {
        let (service, _repo, _wt_base) = test_service(vec![]).await;
        let session = service.create_session("profile-1", None).await.unwrap();
        let result = service.handoff_to_implementation(session.id, "docs/plans/nope.md", "default").await;
        assert!(matches!(result, Err(BrainstormError::UnknownArtifact(_, _))));
    }

    #[tokio::test]
    async fn closed_session_rejects_new_messages() {
        let (service, _repo, _wt_base) = test_service(vec![
            AgenticMessage::ToolCall {
                tool_name: "write_file".to_string(),
                tool_input: serde_json::json!({"path": "docs/plans/design.md"}),
                tool_use_id: "tu_1".to_string(),
            },
            AgenticMessage::Result { text: "done".to_string() },
            AgenticMessage::Usage { usage: Default::default() },
        ])
        .await;
        let session = service.create_session("profile-1", None).await.unwrap();
        service.send_message(session.id, "write it up").await.unwrap();
        service.handoff_to_implementation(session.id, "docs/plans/design.md", "default").await.unwrap();

        let result = service.send_message(session.id, "one more thing").await;
        assert!(matches!(result, Err(BrainstormError::SessionClosed(_, _))));
    }
}
