//! Framework-agnostic LLM driver abstraction (spec component D).
//!
//! Grounded on the original `DriverInterface` protocol
//! (`original_source/amelia/drivers/base.py`: `generate(prompt, system_prompt,
//! schema, **kwargs) -> GenerateResult`) and `runtime_adapter`'s
//! turn/usage accounting, but deliberately decoupled from `rig-core`'s
//! `PromptHook` — a subprocess driver (component J) and any future
//! in-process driver both need to implement this, and `rig-core` only
//! speaks for the latter.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use coordination::events::EventType;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver transport error: {0}")]
    Transport(String),
    #[error("driver returned malformed output: {0}")]
    MalformedOutput(String),
    #[error("driver timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Token/cost accounting for one driver call (spec §3 `tokenUsage`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cache_read_tokens: Option<u64>,
    pub cache_creation_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
}

/// One line of an agentic run's output stream (spec §4.D / §4.J).
///
/// `Usage` is always the final message of a stream: every driver, including
/// the sandbox subprocess driver, is required to emit exactly one before
/// closing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgenticMessage {
    Thinking { text: String },
    ToolCall { tool_name: String, tool_input: Value, tool_use_id: String },
    ToolResult { tool_use_id: String, output: String, is_error: bool },
    Result { text: String },
    Usage { usage: DriverUsage },
}

impl AgenticMessage {
    /// Map to the `eventType` the orchestrator should publish for this
    /// message (spec §4.B), or `None` for `Usage` — usage is folded into
    /// the workflow's `tokenUsage` ledger, not published as its own event.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            AgenticMessage::Thinking { .. } => Some(EventType::ClaudeThinking),
            AgenticMessage::ToolCall { .. } => Some(EventType::ClaudeToolCall),
            AgenticMessage::ToolResult { .. } => Some(EventType::ClaudeToolResult),
            AgenticMessage::Result { .. } => Some(EventType::AgentOutput),
            AgenticMessage::Usage { .. } => None,
        }
    }
}

pub type AgenticStream = Pin<Box<dyn Stream<Item = DriverResult<AgenticMessage>> + Send>>;

/// A single, non-streaming generation.
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub text: String,
    pub usage: DriverUsage,
}

/// Uniform interface every LLM backend implements: a structured one-shot
/// `generate` used by Architect plan drafting and Reviewer judging, and a
/// streamed `execute_agentic` used by the Developer's agentic mode (spec
/// §4.D/§4.E).
#[async_trait]
pub trait Driver: Send + Sync {
    /// One-shot generation, optionally constrained to `schema` (a JSON
    /// Schema document) for structured output.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        schema: Option<&Value>,
    ) -> DriverResult<GenerateResult>;

    /// Start an agentic run and return its message stream. The stream's
    /// final item is always `AgenticMessage::Usage`.
    async fn execute_agentic(&self, prompt: &str, system_prompt: Option<&str>) -> DriverResult<AgenticStream>;

    /// Identifier surfaced in `tokenUsage` records and logs.
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_message_has_no_event_type() {
        let msg = AgenticMessage::Usage { usage: DriverUsage::default() };
        assert_eq!(msg.event_type(), None);
    }

    #[test]
    fn tool_call_maps_to_claude_tool_call_event() {
        let msg = AgenticMessage::ToolCall {
            tool_name: "write_file".to_string(),
            tool_input: serde_json::json!({"path": "a.rs"}),
            tool_use_id: "tu_1".to_string(),
        };
        assert_eq!(msg.event_type(), Some(EventType::ClaudeToolCall));
    }

    #[test]
    fn agentic_message_round_trips_through_json() {
        let msg = AgenticMessage::Result { text: "done".to_string() };
        let json = serde_json::to_string(&msg).unwrap();
        let back: AgenticMessage = serde_json::from_str(&json).unwrap();
        matches!(back, AgenticMessage::Result { .. });
    }
}
