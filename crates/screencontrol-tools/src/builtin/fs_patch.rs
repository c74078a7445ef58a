// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use screencontrol_security::SecurityGate;

use crate::tool::{err, ok, Tool};

/// Apply an ordered list of literal text operations to a file.
///
/// Operation shapes:
/// - `{type: "replace_first" | "replace_all", pattern, replacement}`
/// - `{type: "insert_before" | "insert_after", match, insert}`
///
/// With `dry_run` the `modified` flag is computed without writing, and it is
/// identical to what a real run would report.
pub struct FsPatchTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for FsPatchTool {
    fn name(&self) -> &str {
        "fs_patch"
    }

    fn description(&self) -> &str {
        "Apply ordered text operations (replace_first, replace_all, insert_before, \
         insert_after) to a file. dry_run previews without writing."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path" },
                "operations": { "type": "array", "description": "Patch operations" },
                "dry_run": { "type": "boolean", "description": "Preview without applying" }
            },
            "required": ["path", "operations"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(path) = params.get("path").and_then(|v| v.as_str()).map(str::trim) else {
            return err("missing 'path'");
        };
        let Some(operations) = params.get("operations").and_then(|v| v.as_array()) else {
            return err("missing 'operations'");
        };
        let dry_run = params
            .get("dry_run")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !self.gate.check_path(path).is_allowed() {
            return err("Access denied: protected path");
        }
        debug!(path, ops = operations.len(), dry_run, "fs_patch");

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => return err(format!("Cannot open file: {e}")),
        };
        let original = String::from_utf8_lossy(&bytes).into_owned();
        let mut content = original.clone();

        for (idx, op) in operations.iter().enumerate() {
            if let Err(msg) = apply_op(&mut content, op) {
                return err(format!("operation {idx}: {msg}"));
            }
        }

        let modified = content != original;
        if !dry_run && modified {
            if let Err(e) = tokio::fs::write(path, &content).await {
                return err(format!("Cannot write to file: {e}"));
            }
        }

        ok(json!({
            "path": path,
            "modified": modified,
            "dryRun": dry_run,
        }))
    }
}

fn apply_op(content: &mut String, op: &Value) -> Result<(), String> {
    let op_type = op
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("missing 'type'")?;

    match op_type {
        // "replace" is the historical alias for replace_first.
        "replace_first" | "replace" => {
            let (pattern, replacement) = replace_args(op)?;
            if let Some(pos) = content.find(pattern) {
                content.replace_range(pos..pos + pattern.len(), replacement);
            }
            Ok(())
        }
        "replace_all" => {
            let (pattern, replacement) = replace_args(op)?;
            if !pattern.is_empty() {
                *content = content.replace(pattern, replacement);
            }
            Ok(())
        }
        "insert_before" => {
            let (anchor, insert) = insert_args(op)?;
            if let Some(pos) = content.find(anchor) {
                content.insert_str(pos, insert);
            }
            Ok(())
        }
        "insert_after" => {
            let (anchor, insert) = insert_args(op)?;
            if let Some(pos) = content.find(anchor) {
                content.insert_str(pos + anchor.len(), insert);
            }
            Ok(())
        }
        other => Err(format!("unknown operation type: {other}")),
    }
}

fn replace_args(op: &Value) -> Result<(&str, &str), String> {
    let pattern = op
        .get("pattern")
        .and_then(|v| v.as_str())
        .ok_or("missing 'pattern'")?;
    let replacement = op
        .get("replacement")
        .and_then(|v| v.as_str())
        .ok_or("missing 'replacement'")?;
    Ok((pattern, replacement))
}

fn insert_args(op: &Value) -> Result<(&str, &str), String> {
    let anchor = op
        .get("match")
        .and_then(|v| v.as_str())
        .ok_or("missing 'match'")?;
    let insert = op
        .get("insert")
        .and_then(|v| v.as_str())
        .ok_or("missing 'insert'")?;
    Ok((anchor, insert))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> FsPatchTool {
        FsPatchTool {
            gate: Arc::new(SecurityGate::with_defaults()),
        }
    }

    fn write_tmp(content: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patch.txt");
        std::fs::write(&path, content).unwrap();
        (dir, path.to_string_lossy().into_owned())
    }

    #[tokio::test]
    async fn replace_first_touches_only_first_occurrence() {
        let (_dir, path) = write_tmp("aaa bbb aaa");
        let out = tool()
            .execute(&json!({
                "path": path,
                "operations": [{"type": "replace_first", "pattern": "aaa", "replacement": "X"}]
            }))
            .await;
        assert_eq!(out["modified"], true, "{out}");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "X bbb aaa");
    }

    #[tokio::test]
    async fn replace_all_touches_every_occurrence() {
        let (_dir, path) = write_tmp("aaa bbb aaa");
        tool()
            .execute(&json!({
                "path": path,
                "operations": [{"type": "replace_all", "pattern": "aaa", "replacement": "X"}]
            }))
            .await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "X bbb X");
    }

    #[tokio::test]
    async fn insert_before_and_after_anchor() {
        let (_dir, path) = write_tmp("middle");
        tool()
            .execute(&json!({
                "path": path,
                "operations": [
                    {"type": "insert_before", "match": "middle", "insert": "start "},
                    {"type": "insert_after", "match": "middle", "insert": " end"}
                ]
            }))
            .await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "start middle end");
    }

    #[tokio::test]
    async fn operations_apply_in_order() {
        let (_dir, path) = write_tmp("one");
        tool()
            .execute(&json!({
                "path": path,
                "operations": [
                    {"type": "replace_first", "pattern": "one", "replacement": "two"},
                    {"type": "replace_first", "pattern": "two", "replacement": "three"}
                ]
            }))
            .await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "three");
    }

    #[tokio::test]
    async fn dry_run_reports_modified_without_writing() {
        let (_dir, path) = write_tmp("before");
        let out = tool()
            .execute(&json!({
                "path": path,
                "operations": [{"type": "replace_first", "pattern": "before", "replacement": "after"}],
                "dry_run": true
            }))
            .await;
        assert_eq!(out["modified"], true);
        assert_eq!(out["dryRun"], true);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "before");
    }

    #[tokio::test]
    async fn dry_run_then_real_run_agree_on_modified_and_bytes() {
        let (_dir, path) = write_tmp("hello world");
        let ops = json!([{"type": "replace_all", "pattern": "o", "replacement": "0"}]);

        let dry = tool()
            .execute(&json!({"path": path, "operations": ops.clone(), "dry_run": true}))
            .await;
        let wet = tool()
            .execute(&json!({"path": path, "operations": ops, "dry_run": false}))
            .await;
        assert_eq!(dry["modified"], wet["modified"]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hell0 w0rld");
    }

    #[tokio::test]
    async fn no_match_leaves_file_unmodified() {
        let (_dir, path) = write_tmp("content");
        let out = tool()
            .execute(&json!({
                "path": path,
                "operations": [{"type": "replace_first", "pattern": "missing", "replacement": "x"}]
            }))
            .await;
        assert_eq!(out["modified"], false);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
    }

    #[tokio::test]
    async fn unknown_operation_type_is_error() {
        let (_dir, path) = write_tmp("content");
        let out = tool()
            .execute(&json!({
                "path": path,
                "operations": [{"type": "regex_replace", "pattern": "a", "replacement": "b"}]
            }))
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("unknown operation"));
    }

    #[tokio::test]
    async fn malformed_operation_is_error() {
        let (_dir, path) = write_tmp("content");
        let out = tool()
            .execute(&json!({
                "path": path,
                "operations": [{"type": "replace_first", "pattern": "a"}]
            }))
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("replacement"));
    }

    #[tokio::test]
    async fn patch_protected_path_is_denied() {
        let out = tool()
            .execute(&json!({"path": "/etc/shadow", "operations": []}))
            .await;
        assert_eq!(out["success"], false);
    }
}
