//! Subprocess driver speaking the sandbox worker's JSON-line protocol
//! (spec component J), grounded directly on
//! `original_source/amelia/sandbox/worker.py`: one JSON object per stdout
//! line, the final line is always `USAGE`, stderr is reserved for logs and
//! never parsed as protocol output.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use crate::driver::{AgenticMessage, AgenticStream, Driver, DriverError, DriverResult, DriverUsage, GenerateResult};

/// Launches `worker_command` as a child process per call and speaks its
/// line protocol over stdin/stdout, matching the parent-side half of
/// `worker.py`'s contract.
pub struct SandboxDriver {
    worker_command: String,
    worker_args: Vec<String>,
    model: String,
}

impl SandboxDriver {
    pub fn new(worker_command: impl Into<String>, worker_args: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            worker_command: worker_command.into(),
            worker_args,
            model: model.into(),
        }
    }

    async fn spawn(&self, mode: &str, prompt: &str, system_prompt: Option<&str>) -> DriverResult<Child> {
        let mut command = Command::new(&self.worker_command);
        command
            .args(&self.worker_args)
            .arg("--mode")
            .arg(mode)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| DriverError::Transport(format!("failed to spawn sandbox worker: {e}")))?;

        let request = serde_json::json!({
            "prompt": prompt,
            "system_prompt": system_prompt,
        });
        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&request)
                .map_err(|e| DriverError::Transport(format!("failed to encode request: {e}")))?;
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| DriverError::Transport(e.to_string()))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| DriverError::Transport(e.to_string()))?;
            stdin.shutdown().await.map_err(|e| DriverError::Transport(e.to_string()))?;
        }

        Ok(child)
    }

    fn parse_line(line: &str) -> DriverResult<AgenticMessage> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| DriverError::MalformedOutput(format!("invalid JSON line: {e}")))?;
        serde_json::from_value(value).map_err(|e| DriverError::MalformedOutput(format!("unrecognized message shape: {e}")))
    }
}

#[async_trait]
impl Driver for SandboxDriver {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        _schema: Option<&Value>,
    ) -> DriverResult<GenerateResult> {
        let mut child = self.spawn("generate", prompt, system_prompt).await?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Transport("worker did not expose stdout".to_string()))?;
        let mut reader = BufReader::new(stdout).lines();

        let mut text = String::new();
        let mut usage = DriverUsage::default();
        while let Some(line) = reader
            .next_line()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?
        {
            if line.trim().is_empty() {
                continue;
            }
            match Self::parse_line(&line)? {
                AgenticMessage::Result { text: t } => text = t,
                AgenticMessage::Usage { usage: u } => usage = u,
                _ => {}
            }
        }

        let status = child.wait().await.map_err(|e| DriverError::Transport(e.to_string()))?;
        if !status.success() {
            return Err(DriverError::Transport(format!("worker exited with {status}")));
        }

        Ok(GenerateResult { text, usage })
    }

    async fn execute_agentic(&self, prompt: &str, system_prompt: Option<&str>) -> DriverResult<AgenticStream> {
        let mut child = self.spawn("agentic", prompt, system_prompt).await?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Transport("worker did not expose stdout".to_string()))?;
        let lines = LinesStream::new(BufReader::new(stdout).lines());

        let stream = lines.map(|line| {
            let line = line.map_err(|e| DriverError::Transport(e.to_string()))?;
            Self::parse_line(&line)
        });

        // Keep the child alive for the lifetime of the stream by leaking
        // its handle into a detached task that reaps it once stdout closes.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(Box::pin(stream))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thinking_line() {
        let line = r#"{"type":"THINKING","text":"considering options"}"#;
        let msg = SandboxDriver::parse_line(line).unwrap();
        assert!(matches!(msg, AgenticMessage::Thinking { .. }));
    }

    #[test]
    fn parses_usage_line() {
        let line = r#"{"type":"USAGE","usage":{"input_tokens":10,"output_tokens":20,"cache_read_tokens":null,"cache_creation_tokens":null,"cost_usd":0.01,"duration_ms":500,"num_turns":1}}"#;
        let msg = SandboxDriver::parse_line(line).unwrap();
        match msg {
            AgenticMessage::Usage { usage } => {
                assert_eq!(usage.input_tokens, Some(10));
                assert_eq!(usage.output_tokens, Some(20));
            }
            other => panic!("expected Usage, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_line() {
        let result = SandboxDriver::parse_line("not json");
        assert!(matches!(result, Err(DriverError::MalformedOutput(_))));
    }
}
