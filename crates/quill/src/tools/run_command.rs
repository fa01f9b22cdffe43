//! Shell command execution tool

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{clip_to_boundary, Tool};

const MAX_OUTPUT_BYTES: usize = 50_000;

/// Runs a command under `bash -c` with captured output and a timeout
pub struct RunCommandTool {
    timeout_secs: u64,
}

impl RunCommandTool {
    pub const NAME: &'static str = "run_command";

    pub fn new() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct RunCommandParams {
    command: String,
    working_dir: Option<String>,
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Execute a shell command and return its output. \
         Use for inspecting files, running programs, or checking system state. \
         Commands run under bash with a timeout."
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Working directory for the command (optional)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String, String> {
        let params: RunCommandParams =
            serde_json::from_value(params).map_err(|e| format!("Invalid params: {e}"))?;
        run_command(
            &params.command,
            params.working_dir.as_deref(),
            self.timeout_secs,
        )
        .await
    }
}

async fn run_command(
    command: &str,
    working_dir: Option<&str>,
    timeout_secs: u64,
) -> Result<String, String> {
    let mut cmd = Command::new("bash");
    cmd.arg("-c").arg(command);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    if let Some(dir) = working_dir {
        let path = Path::new(dir);
        if !path.exists() {
            return Err(format!("Working directory does not exist: {dir}"));
        }
        if !path.is_dir() {
            return Err(format!("Not a directory: {dir}"));
        }
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| format!("Failed to spawn: {e}"))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // The timeout covers the pipe reads as well as the wait: a command that
    // sleeps while holding its pipes open must still be killed.
    let collected = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
        let mut stdout_output = String::new();
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                stdout_output.push_str(&line);
                stdout_output.push('\n');
            }
        }

        let mut stderr_output = String::new();
        if let Some(stderr) = stderr {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                stderr_output.push_str(&line);
                stderr_output.push('\n');
            }
        }

        let status = child.wait().await;
        (stdout_output, stderr_output, status)
    })
    .await;

    let (stdout_output, stderr_output, status) = match collected {
        Ok((out, err, Ok(status))) => (out, err, status),
        Ok((_, _, Err(e))) => return Err(format!("Wait failed: {e}")),
        Err(_) => {
            let _ = child.kill().await;
            return Err(format!("Command timed out after {timeout_secs} seconds"));
        }
    };

    let mut output = stdout_output;
    if !stderr_output.is_empty() {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str("[stderr]\n");
        output.push_str(&stderr_output);
    }

    if output.is_empty() {
        output = "(no output)".to_string();
    }

    if let Some(code) = status.code().filter(|&c| c != 0) {
        output.push_str(&format!("\n[exit code: {code}]"));
    }

    if output.len() > MAX_OUTPUT_BYTES {
        let end = clip_to_boundary(&output, MAX_OUTPUT_BYTES);
        output = format!(
            "{}\n\n[... output truncated ({} bytes total)]",
            &output[..end],
            output.len()
        );
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let tool = RunCommandTool::new();
        let output = tool
            .execute(json!({"command": "echo 'hello world'"}))
            .await
            .unwrap();
        assert!(output.contains("hello world"));
    }

    #[tokio::test]
    async fn test_labels_stderr() {
        let tool = RunCommandTool::new();
        let output = tool
            .execute(json!({"command": "echo oops >&2"}))
            .await
            .unwrap();
        assert!(output.contains("[stderr]"));
        assert!(output.contains("oops"));
    }

    #[tokio::test]
    async fn test_reports_nonzero_exit() {
        let tool = RunCommandTool::new();
        let output = tool.execute(json!({"command": "exit 3"})).await.unwrap();
        assert!(output.contains("(no output)"));
        assert!(output.contains("[exit code: 3]"));
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let tool = RunCommandTool::new();
        let output = tool
            .execute(json!({"command": "pwd", "working_dir": "/tmp"}))
            .await
            .unwrap();
        assert!(output.contains("/tmp"));
    }

    #[tokio::test]
    async fn test_rejects_missing_working_dir() {
        let tool = RunCommandTool::new();
        let err = tool
            .execute(json!({"command": "ls", "working_dir": "/no/such/dir"}))
            .await
            .unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[tokio::test]
    async fn test_rejects_bad_params() {
        let tool = RunCommandTool::new();
        let err = tool.execute(json!({"cmd": "ls"})).await.unwrap_err();
        assert!(err.contains("Invalid params"));
    }

    #[tokio::test]
    async fn test_times_out_long_commands() {
        let tool = RunCommandTool { timeout_secs: 1 };
        let err = tool
            .execute(json!({"command": "sleep 5"}))
            .await
            .unwrap_err();
        assert!(err.contains("timed out"));
    }
}
