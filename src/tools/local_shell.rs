//! Local shell tool
//!
//! The model sends a `LocalShellAction` (argv, env, timeout, working
//! directory); a `LocalShellExecutor` runs it and returns the combined output.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::tool::{Tool, ToolContext, ToolKind, ToolResult};
use crate::items::LocalShellAction;
use crate::llm::ToolDefinition;

/// Default timeout in milliseconds (2 minutes)
const DEFAULT_TIMEOUT_MS: u64 = 120000;
/// Maximum timeout in milliseconds (10 minutes)
const MAX_TIMEOUT_MS: u64 = 600000;
/// Maximum output length in characters
const MAX_OUTPUT_LENGTH: usize = 30000;

/// Runs shell actions requested by the model
#[async_trait]
pub trait LocalShellExecutor: Send + Sync {
    /// Execute the action and return its output as sent back to the model
    async fn execute(&self, action: &LocalShellAction) -> Result<String>;
}

/// Executes actions as child processes of the runner
#[derive(Debug, Clone)]
pub struct ProcessShellExecutor {
    working_dir: Option<String>,
    default_timeout_ms: u64,
    max_output: usize,
}

impl ProcessShellExecutor {
    pub fn new() -> Self {
        Self {
            working_dir: None,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output: MAX_OUTPUT_LENGTH,
        }
    }

    /// Directory used when the action does not name one
    pub fn with_working_dir(mut self, working_dir: impl Into<String>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    fn truncate(&self, mut output: String) -> String {
        if output.len() > self.max_output {
            let mut cut = self.max_output;
            while !output.is_char_boundary(cut) {
                cut -= 1;
            }
            output.truncate(cut);
            output.push_str("\n... (output truncated)");
        }
        output
    }
}

impl Default for ProcessShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalShellExecutor for ProcessShellExecutor {
    async fn execute(&self, action: &LocalShellAction) -> Result<String> {
        let (program, args) = action
            .command
            .split_first()
            .context("local shell action has an empty command")?;

        let timeout_ms = action
            .timeout_ms
            .unwrap_or(self.default_timeout_ms)
            .min(MAX_TIMEOUT_MS);

        tracing::info!("[LocalShell] Executing: {}", action.command.join(" "));
        tracing::debug!("[LocalShell] Timeout: {}ms", timeout_ms);

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&action.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = action.working_directory.as_ref().or(self.working_dir.as_ref()) {
            command.current_dir(dir);
        }

        let output = match timeout(Duration::from_millis(timeout_ms), command.output()).await {
            Ok(result) => result.with_context(|| format!("failed to run {}", program))?,
            Err(_) => return Ok(format!("Command timed out after {}ms", timeout_ms)),
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // Combine stdout and stderr
        let mut result = String::new();
        if !stdout.is_empty() {
            result.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str("STDERR:\n");
            result.push_str(&stderr);
        }
        let result = self.truncate(result);

        tracing::debug!("[LocalShell] Exit code: {}, output length: {}", exit_code, result.len());

        if exit_code != 0 {
            return Ok(format!("Command failed with exit code {}\n{}", exit_code, result));
        }
        if result.is_empty() {
            return Ok("Command completed successfully (no output)".to_string());
        }
        Ok(result)
    }
}

/// Tool that hands shell actions to an executor
#[derive(Clone)]
pub struct LocalShellTool {
    executor: Arc<dyn LocalShellExecutor>,
}

impl LocalShellTool {
    pub fn new(executor: Arc<dyn LocalShellExecutor>) -> Self {
        Self { executor }
    }
}

impl std::fmt::Debug for LocalShellTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LocalShellTool")
    }
}

#[async_trait]
impl Tool for LocalShellTool {
    fn name(&self) -> &str {
        "local_shell"
    }

    fn description(&self) -> &str {
        "Run shell commands on the local machine"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::LocalShell
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::LocalShell
    }

    async fn invoke(&self, ctx: &ToolContext, arguments: &str) -> Result<ToolResult> {
        let action: LocalShellAction =
            serde_json::from_str(arguments).context("Invalid local shell action")?;
        tracing::debug!(call_id = %ctx.call_id, "[LocalShellTool] Dispatching action");
        let output = self.executor.execute(&action).await?;
        Ok(ToolResult::success(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::function::tests::test_context;
    use tempfile::TempDir;

    fn action(command: &[&str]) -> LocalShellAction {
        LocalShellAction {
            command: command.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_runs_command() {
        let executor = ProcessShellExecutor::new();
        let output = executor.execute(&action(&["echo", "hello"])).await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_reports_exit_code() {
        let executor = ProcessShellExecutor::new();
        let output = executor
            .execute(&action(&["sh", "-c", "echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert!(output.starts_with("Command failed with exit code 3"));
        assert!(output.contains("STDERR:\noops"));
    }

    #[tokio::test]
    async fn test_times_out() {
        let executor = ProcessShellExecutor::new();
        let mut slow = action(&["sleep", "5"]);
        slow.timeout_ms = Some(50);
        let output = executor.execute(&slow).await.unwrap();
        assert_eq!(output, "Command timed out after 50ms");
    }

    #[tokio::test]
    async fn test_truncates_output() {
        let executor = ProcessShellExecutor::new().with_max_output(10);
        let output = executor
            .execute(&action(&["sh", "-c", "printf 'abcdefghijklmnopqrstuvwxyz'"]))
            .await
            .unwrap();
        assert_eq!(output, "abcdefghij\n... (output truncated)");
    }

    #[tokio::test]
    async fn test_uses_working_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let executor = ProcessShellExecutor::new().with_working_dir(dir.path().to_string_lossy());
        let output = executor.execute(&action(&["ls"])).await.unwrap();
        assert!(output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_empty_command_is_an_error() {
        let tool = LocalShellTool::new(Arc::new(ProcessShellExecutor::new()));
        let err = tool.invoke(&test_context(), r#"{"command": []}"#).await.unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }
}
