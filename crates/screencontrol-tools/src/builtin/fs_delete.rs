// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use screencontrol_security::SecurityGate;

use crate::tool::{err, ok, Tool};

/// Delete a file or directory.
pub struct FsDeleteTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for FsDeleteTool {
    fn name(&self) -> &str {
        "fs_delete"
    }

    fn description(&self) -> &str {
        "Delete a file or directory. Directories require recursive=true unless empty."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to delete" },
                "recursive": { "type": "boolean", "description": "Delete directories recursively" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(path) = params.get("path").and_then(|v| v.as_str()).map(str::trim) else {
            return err("missing 'path'");
        };
        let recursive = params
            .get("recursive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !self.gate.check_path(path).is_allowed() {
            return err("Access denied: protected path");
        }

        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(_) => return err(format!("Path does not exist: {path}")),
        };
        debug!(path, recursive, "fs_delete");

        let result = if meta.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(path).await
            } else {
                tokio::fs::remove_dir(path).await
            }
        } else {
            tokio::fs::remove_file(path).await
        };

        match result {
            Ok(()) => ok(json!({ "path": path })),
            Err(e) => err(format!("Delete failed: {e}")),
        }
    }
}

/// Move or rename a file or directory.
pub struct FsMoveTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for FsMoveTool {
    fn name(&self) -> &str {
        "fs_move"
    }

    fn description(&self) -> &str {
        "Move or rename a file or directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": { "type": "string", "description": "Source path" },
                "destination": { "type": "string", "description": "Destination path" }
            },
            "required": ["source", "destination"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(source) = params.get("source").and_then(|v| v.as_str()).map(str::trim) else {
            return err("missing 'source'");
        };
        let Some(destination) = params
            .get("destination")
            .and_then(|v| v.as_str())
            .map(str::trim)
        else {
            return err("missing 'destination'");
        };

        if !self.gate.check_path(source).is_allowed() {
            return err("Access denied: protected source path");
        }
        if !self.gate.check_path(destination).is_allowed() {
            return err("Access denied: protected destination path");
        }
        debug!(source, destination, "fs_move");

        match tokio::fs::rename(source, destination).await {
            Ok(()) => ok(json!({ "source": source, "destination": destination })),
            Err(e) => err(format!("Move failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
