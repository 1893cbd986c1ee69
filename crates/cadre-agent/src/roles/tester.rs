use crate::agent::Agent;
use crate::behavior::RoleBehavior;
use crate::types::AgentTask;
use async_trait::async_trait;
use cadre_core::{CadreError, CadreResult};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::info;

/// Command used when a test task names none.
pub const DEFAULT_TEST_COMMAND: &str = "cargo test";

/// Keep only the tail of captured output.
const OUTPUT_TAIL_LINES: usize = 40;

/// Runs a test command as a subprocess under a fixed wall-clock limit.
pub struct TesterRole {
    timeout: Duration,
}

impl TesterRole {
    /// Tester that kills a test run after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn tail(output: &[u8]) -> String {
        let text = String::from_utf8_lossy(output);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
        lines[start..].join("\n")
    }

    async fn run(&self, command_line: &str) -> CadreResult<serde_json::Value> {
        let command_line = if command_line.trim().is_empty() {
            DEFAULT_TEST_COMMAND
        } else {
            command_line.trim()
        };
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| CadreError::TaskExecution("empty test command".to_string()))?;

        info!(command = %command_line, timeout_secs = self.timeout.as_secs(), "Running tests");
        let started = Instant::now();
        let child = Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                CadreError::TaskExecution(format!(
                    "'{command_line}' timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })?
            .map_err(|e| {
                CadreError::TaskExecution(format!("failed to start '{command_line}': {e}"))
            })?;

        Ok(serde_json::json!({
            "command": command_line,
            "passed": output.status.success(),
            "exit_code": output.status.code(),
            "duration_ms": started.elapsed().as_millis() as u64,
            "stdout": Self::tail(&output.stdout),
            "stderr": Self::tail(&output.stderr),
        }))
    }
}

#[async_trait]
impl RoleBehavior for TesterRole {
    fn role(&self) -> &str {
        "tester"
    }

    async fn perform_action(
        &self,
        _agent: &Agent,
        action: &str,
        description: &str,
        _task: &AgentTask,
    ) -> CadreResult<serde_json::Value> {
        match action {
            "run_tests" => self.run(description).await,
            other => Err(CadreError::TaskExecution(format!(
                "tester cannot perform '{other}'"
            ))),
        }
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passing_command() {
        let tester = TesterRole::new(Duration::from_secs(10));
        let report = tester.run("echo all green").await.unwrap();
        assert_eq!(report["passed"], true);
        assert_eq!(report["exit_code"], 0);
        assert_eq!(report["stdout"], "all green");
    }

    #[tokio::test]
    async fn test_failing_command_is_a_result() {
        let tester = TesterRole::new(Duration::from_secs(10));
        let report = tester.run("false").await.unwrap();
        assert_eq!(report["passed"], false);
    }

    #[tokio::test]
    async fn test_timeout() {
        let tester = TesterRole::new(Duration::from_millis(100));
        let err = tester.run("sleep 5").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let tester = TesterRole::new(Duration::from_secs(1));
        let err = tester.run("no-such-binary-cadre").await.unwrap_err();
        assert!(matches!(err, CadreError::TaskExecution(_)));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let output: String = (0..100).map(|i| format!("line {i}\n")).collect();
        let tail = TesterRole::tail(output.as_bytes());
        assert_eq!(tail.lines().count(), OUTPUT_TAIL_LINES);
        assert!(tail.ends_with("line 99"));
    }
}
