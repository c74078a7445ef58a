// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Clipboard access through the platform's conventional helpers
//! (`xclip`/`xsel`, `pbcopy`/`pbpaste`, PowerShell `*-Clipboard`).  Text is
//! always piped through stdin, never interpolated into a shell line.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::tool::{err, ok, Tool};

pub struct ClipboardReadTool;

#[async_trait]
impl Tool for ClipboardReadTool {
    fn name(&self) -> &str {
        "clipboard_read"
    }

    fn description(&self) -> &str {
        "Read text from the system clipboard."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: &Value) -> Value {
        for (cmd, args) in read_commands() {
            if let Some(text) = run_capture(cmd, args).await {
                return ok(json!({ "text": text }));
            }
        }
        err("No clipboard tool available")
    }
}

pub struct ClipboardWriteTool;

#[async_trait]
impl Tool for ClipboardWriteTool {
    fn name(&self) -> &str {
        "clipboard_write"
    }

    fn description(&self) -> &str {
        "Write text to the system clipboard."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to write to the clipboard" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(text) = params.get("text").and_then(|v| v.as_str()) else {
            return err("missing 'text'");
        };
        for (cmd, args) in write_commands() {
            if run_with_stdin(cmd, args, text).await {
                return ok(json!({ "bytesWritten": text.len() }));
            }
        }
        err("No clipboard tool available")
    }
}

fn read_commands() -> &'static [(&'static str, &'static [&'static str])] {
    #[cfg(target_os = "macos")]
    {
        &[("pbpaste", &[])]
    }
    #[cfg(target_os = "windows")]
    {
        &[("powershell", &["-NoProfile", "-Command", "Get-Clipboard -Raw"])]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        &[
            ("xclip", &["-selection", "clipboard", "-o"]),
            ("xsel", &["--clipboard", "--output"]),
        ]
    }
}

fn write_commands() -> &'static [(&'static str, &'static [&'static str])] {
    #[cfg(target_os = "macos")]
    {
        &[("pbcopy", &[])]
    }
    #[cfg(target_os = "windows")]
    {
        &[("powershell", &["-NoProfile", "-Command", "$input | Set-Clipboard"])]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        &[
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
        ]
    }
}

async fn run_capture(cmd: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn run_with_stdin(cmd: &str, args: &[&str], input: &str) -> bool {
    let child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match child {
        Ok(c) => c,
        Err(_) => return false,
    };
    if let Some(mut stdin) = child.stdin.take() {
        if stdin.write_all(input.as_bytes()).await.is_err() {
            return false;
        }
        drop(stdin); // EOF so the helper commits the clipboard
    }
    child.wait().await.map(|s| s.success()).unwrap_or(false)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
