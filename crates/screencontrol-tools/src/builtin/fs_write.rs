// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use screencontrol_security::SecurityGate;

use crate::tool::{err, ok, Tool};

/// Write or append file content, optionally creating parent directories.
pub struct FsWriteTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for FsWriteTool {
    fn name(&self) -> &str {
        "fs_write"
    }

    fn description(&self) -> &str {
        "Write content to a file. mode is 'overwrite' (default) or 'append'; \
         create_directories makes missing parent directories."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path" },
                "content": { "type": "string", "description": "Content to write" },
                "mode": { "type": "string", "enum": ["overwrite", "append"] },
                "create_directories": { "type": "boolean", "description": "Create parent directories" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(path) = params.get("path").and_then(|v| v.as_str()).map(str::trim) else {
            return err("missing 'path'");
        };
        let Some(content) = params.get("content").and_then(|v| v.as_str()) else {
            return err("missing 'content'");
        };
        let mode = params
            .get("mode")
            .and_then(|v| v.as_str())
            .unwrap_or("overwrite");
        let create_dirs = params
            .get("create_directories")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !matches!(mode, "overwrite" | "append") {
            return err(format!("invalid mode: {mode}"));
        }
        if !self.gate.check_path(path).is_allowed() {
            return err("Access denied: protected path");
        }
        debug!(path, mode, bytes = content.len(), "fs_write");

        if create_dirs {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        return err(format!("Cannot create directories: {e}"));
                    }
                }
            }
        }

        let result = if mode == "append" {
            match tokio::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .await
            {
                Ok(mut f) => f.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(path, content).await
        };

        match result {
            Ok(()) => ok(json!({
                "path": path,
                "bytesWritten": content.len(),
                "mode": mode,
            })),
            Err(e) => err(format!("Cannot write to file: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> FsWriteTool {
        FsWriteTool {
            gate: Arc::new(SecurityGate::with_defaults()),
        }
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        let out = tool()
            .execute(&json!({"path": path.to_str().unwrap(), "content": "hello"}))
            .await;
        assert_eq!(out["success"], true, "{out}");
        assert_eq!(out["bytesWritten"], 5);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn append_mode_extends_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        let p = path.to_str().unwrap();
        tool()
            .execute(&json!({"path": p, "content": "one\n"}))
            .await;
        tool()
            .execute(&json!({"path": p, "content": "two\n", "mode": "append"}))
            .await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        let p = path.to_str().unwrap();
        tool().execute(&json!({"path": p, "content": "long first version"})).await;
        tool().execute(&json!({"path": p, "content": "short"})).await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "short");
    }

    #[tokio::test]
    async fn create_directories_makes_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        let out = tool()
            .execute(&json!({
                "path": path.to_str().unwrap(),
                "content": "nested",
                "create_directories": true
            }))
            .await;
        assert_eq!(out["success"], true, "{out}");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "nested");
    }

    #[tokio::test]
    async fn missing_parent_without_flag_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing/sub/c.txt");
        let out = tool()
            .execute(&json!({"path": path.to_str().unwrap(), "content": "x"}))
            .await;
        assert_eq!(out["success"], false);
    }

    #[tokio::test]
    async fn write_to_protected_path_is_denied() {
        let out = tool()
            .execute(&json!({"path": "/etc/shadow", "content": "x"}))
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("protected"));
    }

    #[tokio::test]
    async fn invalid_mode_is_error() {
        let out = tool()
            .execute(&json!({"path": "/tmp/x.txt", "content": "x", "mode": "truncate"}))
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("mode"));
    }

    #[tokio::test]
    async fn missing_content_is_error() {
        let out = tool().execute(&json!({"path": "/tmp/x.txt"})).await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("content"));
    }
}
