//! The append-only `WorkflowEvent` log entry and its closed `eventType` enum
//! (spec §3 "Event log entries").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed set of event types a node or agent may emit (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    AgentStarted,
    AgentCompleted,
    ClaudeThinking,
    ClaudeToolCall,
    ClaudeToolResult,
    AgentOutput,
    Blocked,
    BatchApprovalRequested,
    BatchApproved,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    OracleConsultationStarted,
    OracleConsultationCompleted,
    OracleConsultationFailed,
    OracleToolCall,
    OracleToolResult,
    BrainstormMessageComplete,
    BrainstormArtifactCreated,
    BrainstormSessionCreated,
}

impl EventType {
    /// Event types that end a workflow's stream (spec §8 invariant 3).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventType::WorkflowCompleted | EventType::WorkflowFailed | EventType::WorkflowCancelled
        )
    }
}

/// A single append-only log entry (spec §3 / wire format §6).
///
/// `sequence` is assigned monotonically per `workflow_id` by the emitter
/// factory (component G), never by the bus or the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub event_type: EventType,
    pub message: Option<String>,
    pub tool_name: Option<String>,
    pub tool_input: Option<Value>,
    pub tool_output: Option<String>,
    pub is_error: bool,
    pub session_id: Option<String>,
}

impl WorkflowEvent {
    /// Construct an event with `sequence` left at 0; the emitter factory
    /// (component G) is responsible for assigning the real value before
    /// publishing.
    pub fn new(workflow_id: Uuid, agent: impl Into<String>, event_type: EventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            sequence: 0,
            timestamp: Utc::now(),
            agent: agent.into(),
            event_type,
            message: None,
            tool_name: None,
            tool_input: None,
            tool_output: None,
            is_error: false,
            session_id: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_event_types() {
        assert!(EventType::WorkflowCompleted.is_terminal());
        assert!(EventType::WorkflowFailed.is_terminal());
        assert!(EventType::WorkflowCancelled.is_terminal());
        assert!(!EventType::AgentStarted.is_terminal());
    }

    #[test]
    fn event_round_trips_through_json() {
        let wf = Uuid::new_v4();
        let event = WorkflowEvent::new(wf, "architect", EventType::AgentStarted)
            .with_message("starting")
            .with_sequence(1);
        let json = serde_json::to_string(&event).unwrap();
        let back: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, 1);
        assert_eq!(back.workflow_id, wf);
        assert_eq!(back.event_type, EventType::AgentStarted);
    }
}
