// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use screencontrol_security::SecurityGate;

use crate::tool::{err, ok, Tool};

/// Hard ceiling on entries returned by one listing.
const MAX_ENTRIES: usize = 1000;

/// List directory contents, optionally recursively.  Children the security
/// gate denies are silently dropped from the listing.
pub struct FsListTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for FsListTool {
    fn name(&self) -> &str {
        "fs_list"
    }

    fn description(&self) -> &str {
        "List directory contents. With recursive=true the walk descends up to \
         max_depth levels (0 = unlimited). At most 1000 entries are returned."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path" },
                "recursive": { "type": "boolean", "description": "List recursively" },
                "max_depth": { "type": "number", "description": "Max recursion depth (0 = unlimited)" }
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
        let max_depth = params
            .get("max_depth")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;

        if !self.gate.check_path(path).is_allowed() {
            return err("Access denied: protected path");
        }
        if !std::path::Path::new(path).exists() {
            return err(format!("Path does not exist: {path}"));
        }
        debug!(path, recursive, max_depth, "fs_list");

        let gate = self.gate.clone();
        let root = path.to_string();
        let listing = tokio::task::spawn_blocking(move || {
            let depth = if !recursive {
                1
            } else if max_depth == 0 {
                usize::MAX
            } else {
                max_depth
            };

            let mut entries = Vec::new();
            let mut truncated = false;
            let walker = WalkDir::new(&root)
                .min_depth(1)
                .max_depth(depth)
                .into_iter()
                .filter_entry(|e| !gate.should_hide(&e.path().to_string_lossy()));

            for entry in walker.filter_map(Result::ok) {
                if entries.len() >= MAX_ENTRIES {
                    truncated = true;
                    break;
                }
                let meta = entry.metadata().ok();
                let file_type = entry.file_type();
                let mut item = json!({
                    "name": entry.file_name().to_string_lossy(),
                    "path": entry.path().to_string_lossy(),
                    "isDirectory": file_type.is_dir(),
                    "isFile": file_type.is_file(),
                    "isSymlink": file_type.is_symlink(),
                });
                if file_type.is_file() {
                    if let Some(meta) = meta {
                        item["size"] = json!(meta.len());
                    }
                }
                entries.push(item);
            }
            (entries, truncated)
        })
        .await;

        match listing {
            Ok((entries, truncated)) => {
                let count = entries.len();
                ok(json!({
                    "path": path,
                    "entries": entries,
                    "count": count,
                    "truncated": truncated,
                    "limit": MAX_ENTRIES,
                }))
            }
            Err(e) => err(format!("Listing failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
