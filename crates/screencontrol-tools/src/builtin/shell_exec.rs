// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use screencontrol_security::SecurityGate;

use crate::tool::{err, ok, Tool};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Run one command through the platform's conventional shell and wait for
/// completion.  The command filter runs before anything is spawned; a denied
/// command never creates a child process.
pub struct ShellExecTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return exit_code, stdout and stderr. \
         Killed with timeout:true when timeout_seconds (default 30) elapses."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Command to execute" },
                "cwd": { "type": "string", "description": "Working directory" },
                "timeout_seconds": { "type": "number", "description": "Timeout in seconds" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(command) = params.get("command").and_then(|v| v.as_str()) else {
            return err("missing 'command'");
        };
        let cwd = params.get("cwd").and_then(|v| v.as_str());
        let timeout_seconds = params
            .get("timeout_seconds")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .max(1);

        if let screencontrol_security::CheckResult::Deny { reason, .. } =
            self.gate.check_command(command)
        {
            return err(format!("Command blocked: {reason}"));
        }
        debug!(cmd = %command, timeout_seconds, "shell_exec");

        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd.filter(|d| !d.is_empty()) {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return err(format!("spawn error: {e}")),
        };

        // Incremental drains into shared buffers: a timed-out command still
        // yields whatever it produced, and a grandchild that inherits the
        // pipes cannot stall the reply waiting for EOF.
        let stdout_buf = Arc::new(std::sync::Mutex::new(String::new()));
        let stderr_buf = Arc::new(std::sync::Mutex::new(String::new()));
        let stdout_task = drain(child.stdout.take(), stdout_buf.clone());
        let stderr_task = drain(child.stderr.take(), stderr_buf.clone());

        let status = tokio::time::timeout(Duration::from_secs(timeout_seconds), child.wait()).await;

        match status {
            Ok(Ok(status)) => {
                flush_readers(stdout_task, stderr_task).await;
                ok(json!({
                    "command": command,
                    "exit_code": status.code().unwrap_or(-1),
                    "stdout": take(&stdout_buf),
                    "stderr": take(&stderr_buf),
                }))
            }
            Ok(Err(e)) => err(format!("wait error: {e}")),
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                flush_readers(stdout_task, stderr_task).await;
                json!({
                    "success": false,
                    "error": "Command timed out",
                    "timeout": true,
                    "stdout": take(&stdout_buf),
                    "stderr": take(&stderr_buf),
                })
            }
        }
    }
}

/// Give the drain tasks a short window to flush, then abandon them; pipes
/// held open by detached grandchildren must not delay the reply.
async fn flush_readers(
    stdout_task: tokio::task::JoinHandle<()>,
    stderr_task: tokio::task::JoinHandle<()>,
) {
    let grace = Duration::from_millis(200);
    let _ = tokio::time::timeout(grace, stdout_task).await;
    let _ = tokio::time::timeout(grace, stderr_task).await;
}

fn take(buf: &Arc<std::sync::Mutex<String>>) -> String {
    std::mem::take(&mut *buf.lock().unwrap())
}

fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("powershell");
        cmd.args(["-NoLogo", "-NoProfile", "-Command", command]);
        cmd
    }
}

fn drain<R>(pipe: Option<R>, buf: Arc<std::sync::Mutex<String>>) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else { return };
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf
                    .lock()
                    .unwrap()
                    .push_str(&String::from_utf8_lossy(&chunk[..n])),
            }
        }
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
