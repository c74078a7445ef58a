// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tracing::debug;

use screencontrol_security::SecurityGate;

use crate::tool::{err, ok, Tool};

/// Default read cap: 1 MiB.
const DEFAULT_MAX_BYTES: u64 = 1_048_576;

/// Read a file's leading bytes, reporting the full size and whether the
/// content was truncated.
pub struct FsReadTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for FsReadTool {
    fn name(&self) -> &str {
        "fs_read"
    }

    fn description(&self) -> &str {
        "Read file contents. Returns at most max_bytes (default 1 MiB) with a \
         truncated flag when the file is larger."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path" },
                "max_bytes": { "type": "number", "description": "Maximum bytes to read" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(path) = params.get("path").and_then(|v| v.as_str()).map(str::trim) else {
            return err("missing 'path'");
        };
        let max_bytes = params
            .get("max_bytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_BYTES);

        if !self.gate.check_path(path).is_allowed() {
            return err("Access denied: protected path");
        }
        debug!(path, max_bytes, "fs_read");

        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) => return err(format!("Cannot open file: {e}")),
        };
        let size = match file.metadata().await {
            Ok(m) => m.len(),
            Err(e) => return err(format!("Cannot stat file: {e}")),
        };

        let mut bytes = Vec::with_capacity(size.min(max_bytes) as usize);
        if let Err(e) = (&mut file).take(max_bytes).read_to_end(&mut bytes).await {
            return err(format!("Read error: {e}"));
        }

        ok(json!({
            "path": path,
            "content": String::from_utf8_lossy(&bytes),
            "size": size,
            "truncated": size > max_bytes,
        }))
    }
}

/// Read a 1-based inclusive line range; a negative end means EOF.
pub struct FsReadRangeTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for FsReadRangeTool {
    fn name(&self) -> &str {
        "fs_read_range"
    }

    fn description(&self) -> &str {
        "Read a specific line range from a file (1-based, inclusive; end_line -1 means EOF)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path" },
                "start_line": { "type": "number", "description": "Start line (1-indexed)" },
                "end_line": { "type": "number", "description": "End line (-1 for EOF)" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(path) = params.get("path").and_then(|v| v.as_str()).map(str::trim) else {
            return err("missing 'path'");
        };
        let start_line = params
            .get("start_line")
            .and_then(|v| v.as_i64())
            .unwrap_or(1)
            .max(1);
        let end_line = params.get("end_line").and_then(|v| v.as_i64()).unwrap_or(-1);

        if !self.gate.check_path(path).is_allowed() {
            return err("Access denied: protected path");
        }
        debug!(path, start_line, end_line, "fs_read_range");

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => return err(format!("Cannot open file: {e}")),
        };
        let text = String::from_utf8_lossy(&bytes);

        let mut content = String::new();
        let mut line_count = 0usize;
        let mut last_line = 0i64;
        for (idx, line) in text.lines().enumerate() {
            let line_num = idx as i64 + 1;
            last_line = line_num;
            if line_num < start_line {
                continue;
            }
            if end_line >= 0 && line_num > end_line {
                break;
            }
            content.push_str(line);
            content.push('\n');
            line_count += 1;
        }

        ok(json!({
            "path": path,
            "content": content,
            "startLine": start_line,
            "endLine": if end_line < 0 { last_line } else { end_line },
            "lineCount": line_count,
        }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> Arc<SecurityGate> {
        Arc::new(SecurityGate::with_defaults())
    }

    fn write_tmp(content: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, content).unwrap();
        (dir, path.to_string_lossy().into_owned())
    }

    // ── fs_read ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn reads_whole_file() {
        let (_dir, path) = write_tmp("hello");
        let out = FsReadTool { gate: gate() }
            .execute(&json!({"path": path}))
            .await;
        assert_eq!(out["success"], true, "{out}");
        assert_eq!(out["content"], "hello");
        assert_eq!(out["size"], 5);
        assert_eq!(out["truncated"], false);
    }

    #[tokio::test]
    async fn truncates_beyond_max_bytes() {
        let (_dir, path) = write_tmp("abcdefghij");
        let out = FsReadTool { gate: gate() }
            .execute(&json!({"path": path, "max_bytes": 4}))
            .await;
        assert_eq!(out["content"], "abcd");
        assert_eq!(out["size"], 10);
        assert_eq!(out["truncated"], true);
    }

    #[tokio::test]
    async fn file_exactly_max_bytes_is_not_truncated() {
        let (_dir, path) = write_tmp("abcd");
        let out = FsReadTool { gate: gate() }
            .execute(&json!({"path": path, "max_bytes": 4}))
            .await;
        assert_eq!(out["content"], "abcd");
        assert_eq!(out["truncated"], false);
    }

    #[tokio::test]
    async fn read_missing_file_is_error() {
        let out = FsReadTool { gate: gate() }
            .execute(&json!({"path": "/tmp/screencontrol_missing_xyz.txt"}))
            .await;
        assert_eq!(out["success"], false);
    }

    #[tokio::test]
    async fn read_protected_path_is_denied() {
        let out = FsReadTool { gate: gate() }
            .execute(&json!({"path": "/etc/shadow"}))
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("protected"));
    }

    #[tokio::test]
    async fn missing_path_is_error() {
        let out = FsReadTool { gate: gate() }.execute(&json!({})).await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("path"));
    }

    // ── fs_read_range ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn range_selects_inclusive_lines() {
        let (_dir, path) = write_tmp("one\ntwo\nthree\nfour\n");
        let out = FsReadRangeTool { gate: gate() }
            .execute(&json!({"path": path, "start_line": 2, "end_line": 3}))
            .await;
        assert_eq!(out["content"], "two\nthree\n");
        assert_eq!(out["lineCount"], 2);
        assert_eq!(out["endLine"], 3);
    }

    #[tokio::test]
    async fn negative_end_reads_to_eof() {
        let (_dir, path) = write_tmp("one\ntwo\nthree\n");
        let out = FsReadRangeTool { gate: gate() }
            .execute(&json!({"path": path, "start_line": 1, "end_line": -1}))
            .await;
        assert_eq!(out["content"], "one\ntwo\nthree\n");
        assert_eq!(out["lineCount"], 3);
        assert_eq!(out["endLine"], 3);
    }

    #[tokio::test]
    async fn full_range_equals_full_read_line_by_line() {
        let (_dir, path) = write_tmp("a\nb\nc\n");
        let range = FsReadRangeTool { gate: gate() }
            .execute(&json!({"path": path, "start_line": 1, "end_line": -1}))
            .await;
        let read = FsReadTool { gate: gate() }
            .execute(&json!({"path": path}))
            .await;
        assert_eq!(range["content"], read["content"]);
    }

    #[tokio::test]
    async fn start_past_eof_yields_empty_content() {
        let (_dir, path) = write_tmp("a\nb\n");
        let out = FsReadRangeTool { gate: gate() }
            .execute(&json!({"path": path, "start_line": 10, "end_line": 20}))
            .await;
        assert_eq!(out["success"], true);
        assert_eq!(out["content"], "");
        assert_eq!(out["lineCount"], 0);
    }

    #[tokio::test]
    async fn range_on_protected_path_is_denied() {
        let out = FsReadRangeTool { gate: gate() }
            .execute(&json!({"path": "/etc/shadow", "start_line": 1, "end_line": 1}))
            .await;
        assert_eq!(out["success"], false);
    }
}
