//! Records for the brainstorm subsystem (spec component I): a long-lived
//! chat session with an agent that can hand off to a workflow once it
//! produces an artifact. Grounded on
//! `original_source/amelia/server/models/brainstorm.py`'s
//! `BrainstormingSession`/`Message`/`MessagePart`/`Artifact`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of a brainstorming session (spec §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrainstormStatus {
    Active,
    ReadyForHandoff,
    Completed,
    Failed,
}

impl std::fmt::Display for BrainstormStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BrainstormStatus::Active => "active",
            BrainstormStatus::ReadyForHandoff => "ready_for_handoff",
            BrainstormStatus::Completed => "completed",
            BrainstormStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A long-lived chat session carrying a `driver_session_id` for multi-turn
/// continuity (spec §4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainstormSession {
    pub id: Uuid,
    pub profile_id: String,
    pub driver_session_id: Option<String>,
    pub status: BrainstormStatus,
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BrainstormSession {
    pub fn new(profile_id: impl Into<String>, topic: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            profile_id: profile_id.into(),
            driver_session_id: None,
            status: BrainstormStatus::Active,
            topic,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One structured part of a message: text, a tool call, a tool result, or a
/// reasoning block (spec §4.I, AI-SDK-`UIMessage`-compatible shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text { text: String },
    ToolCall { tool_call_id: String, tool_name: String, args: Value },
    ToolResult { tool_call_id: String, result: String },
    Reasoning { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One message in a session, ordered by a monotonic per-session `sequence`
/// (spec §4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainstormMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sequence: u32,
    pub role: MessageRole,
    pub content: String,
    pub parts: Vec<MessagePart>,
    pub created_at: DateTime<Utc>,
}

/// A document a session produced, detected from a `write_file` tool call
/// (spec §4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub session_id: Uuid,
    pub artifact_type: String,
    pub path: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Infer an artifact's type from the directory segment of `path` (spec
/// §4.I / §8 Scenario 6: `docs/plans/` -> "design").
pub fn infer_artifact_type(path: &str) -> String {
    let known = [
        ("docs/plans/", "design"),
        ("docs/adr/", "adr"),
        ("docs/specs/", "spec"),
        ("docs/rfcs/", "rfc"),
    ];
    for (prefix, kind) in known {
        if path.contains(prefix) {
            return kind.to_string();
        }
    }
    if path.to_ascii_lowercase().ends_with("readme.md") {
        return "readme".to_string();
    }
    "document".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_design_type_from_plans_directory() {
        assert_eq!(infer_artifact_type("docs/plans/2026-01-18-cache-design.md"), "design");
    }

    #[test]
    fn infers_readme_type() {
        assert_eq!(infer_artifact_type("project/README.md"), "readme");
    }

    #[test]
    fn falls_back_to_generic_document_type() {
        assert_eq!(infer_artifact_type("notes/scratch.txt"), "document");
    }

    #[test]
    fn new_session_starts_active_with_no_driver_session() {
        let session = BrainstormSession::new("profile-1", Some("caching layer".to_string()));
        assert_eq!(session.status, BrainstormStatus::Active);
        assert!(session.driver_session_id.is_none());
    }
}
