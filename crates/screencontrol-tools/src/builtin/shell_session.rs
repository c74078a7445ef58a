// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use screencontrol_security::SecurityGate;

use crate::sessions::SessionManager;
use crate::tool::{err, ok, Tool};

/// Start a long-lived interactive shell session.
pub struct ShellStartSessionTool {
    pub gate: Arc<SecurityGate>,
    pub sessions: Arc<SessionManager>,
}

#[async_trait]
impl Tool for ShellStartSessionTool {
    fn name(&self) -> &str {
        "shell_start_session"
    }

    fn description(&self) -> &str {
        "Start an interactive shell session. Without a command the platform's \
         default shell is started. Returns session_id and pid."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Initial command (optional)" },
                "cwd": { "type": "string", "description": "Working directory" }
            }
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let command = params.get("command").and_then(|v| v.as_str());
        let cwd = params.get("cwd").and_then(|v| v.as_str());

        if let Some(cmd) = command.filter(|c| !c.is_empty()) {
            if let screencontrol_security::CheckResult::Deny { reason, .. } =
                self.gate.check_command(cmd)
            {
                return err(format!("Command blocked: {reason}"));
            }
        }
        self.sessions.start(command, cwd).await
    }
}

/// Write to a session's stdin.
pub struct ShellSendInputTool {
    pub sessions: Arc<SessionManager>,
}

#[async_trait]
impl Tool for ShellSendInputTool {
    fn name(&self) -> &str {
        "shell_send_input"
    }

    fn description(&self) -> &str {
        "Send input to a shell session's stdin."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string", "description": "Session ID" },
                "input": { "type": "string", "description": "Input to send" }
            },
            "required": ["session_id", "input"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(session_id) = params.get("session_id").and_then(|v| v.as_str()) else {
            return err("missing 'session_id'");
        };
        let Some(input) = params.get("input").and_then(|v| v.as_str()) else {
            return err("missing 'input'");
        };
        self.sessions.send_input(session_id, input).await
    }
}

/// Drain a session's buffered stdout/stderr.
pub struct ShellReadOutputTool {
    pub sessions: Arc<SessionManager>,
}

#[async_trait]
impl Tool for ShellReadOutputTool {
    fn name(&self) -> &str {
        "shell_read_output"
    }

    fn description(&self) -> &str {
        "Read output buffered by a shell session since the last read."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string", "description": "Session ID" }
            },
            "required": ["session_id"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(session_id) = params.get("session_id").and_then(|v| v.as_str()) else {
            return err("missing 'session_id'");
        };
        self.sessions.read_output(session_id).await
    }
}

/// Stop a session with the given signal.
pub struct ShellStopSessionTool {
    pub sessions: Arc<SessionManager>,
}

#[async_trait]
impl Tool for ShellStopSessionTool {
    fn name(&self) -> &str {
        "shell_stop_session"
    }

    fn description(&self) -> &str {
        "Stop a shell session. signal is TERM (default), INT, HUP or KILL."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string", "description": "Session ID" },
                "signal": { "type": "string", "description": "Signal to send (TERM, INT, HUP, KILL)" }
            },
            "required": ["session_id"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(session_id) = params.get("session_id").and_then(|v| v.as_str()) else {
            return err("missing 'session_id'");
        };
        let signal = params
            .get("signal")
            .and_then(|v| v.as_str())
            .unwrap_or("TERM");
        self.sessions.stop(session_id, signal).await
    }
}

/// Snapshot of the live sessions.
pub struct ShellListSessionsTool {
    pub sessions: Arc<SessionManager>,
}

#[async_trait]
impl Tool for ShellListSessionsTool {
    fn name(&self) -> &str {
        "shell_list_sessions"
    }

    fn description(&self) -> &str {
        "List active shell sessions."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: &Value) -> Value {
        let sessions = self.sessions.list();
        let count = sessions.len();
        ok(json!({ "sessions": sessions, "count": count }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
