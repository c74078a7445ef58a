// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use screencontrol_security::SecurityGate;

use crate::builtin::fs_search::walk_matches;
use crate::tool::{err, ok, Tool};

/// How many files one grep may open when the base is a directory.
const FILE_SCAN_CAP: usize = 1000;

/// Regex search over the lines of files selected by a glob walk.
pub struct FsGrepTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for FsGrepTool {
    fn name(&self) -> &str {
        "fs_grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regex. When path is a directory, files are \
         selected by the glob filter first (default '*')."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Base path (file or directory)" },
                "pattern": { "type": "string", "description": "Regex pattern" },
                "glob": { "type": "string", "description": "File glob filter (default '*')" },
                "max_matches": { "type": "number", "description": "Maximum matches (default 100)" }
            },
            "required": ["path", "pattern"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(base) = params.get("path").and_then(|v| v.as_str()).map(str::trim) else {
            return err("missing 'path'");
        };
        let Some(pattern) = params.get("pattern").and_then(|v| v.as_str()) else {
            return err("missing 'pattern'");
        };
        let glob = params.get("glob").and_then(|v| v.as_str()).unwrap_or("*");
        let max_matches = params
            .get("max_matches")
            .and_then(|v| v.as_u64())
            .unwrap_or(100) as usize;

        if !self.gate.check_path(base).is_allowed() {
            return err("Access denied: protected path");
        }
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => return err(format!("invalid regex: {e}")),
        };
        debug!(base, pattern, glob, max_matches, "fs_grep");

        let files = if std::path::Path::new(base).is_file() {
            vec![base.to_string()]
        } else {
            match walk_matches(self.gate.clone(), base, glob, FILE_SCAN_CAP).await {
                Ok(files) => files,
                Err(e) => return err(e),
            }
        };

        let mut matches = Vec::new();
        'files: for file in files {
            let bytes = match tokio::fs::read(&file).await {
                Ok(b) => b,
                Err(_) => continue, // unreadable files are skipped, not fatal
            };
            let text = String::from_utf8_lossy(&bytes);
            for (idx, line) in text.lines().enumerate() {
                if re.is_match(line) {
                    matches.push(json!({
                        "file": file,
                        "line": idx + 1,
                        "content": line,
                    }));
                    if matches.len() >= max_matches {
                        break 'files;
                    }
                }
            }
        }

        let count = matches.len();
        ok(json!({ "matches": matches, "count": count }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> FsGrepTool {
        FsGrepTool {
            gate: Arc::new(SecurityGate::with_defaults()),
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\nbeta TODO\ngamma\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "TODO first\nplain\n").unwrap();
        std::fs::write(dir.path().join("c.log"), "TODO in log\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn finds_matches_with_line_numbers() {
        let dir = fixture();
        let out = tool()
            .execute(&json!({
                "path": dir.path().to_str().unwrap(),
                "pattern": "TODO",
                "glob": "*.txt"
            }))
            .await;
        assert_eq!(out["success"], true, "{out}");
        assert_eq!(out["count"], 2);
        let matches = out["matches"].as_array().unwrap();
        assert!(matches.iter().any(|m| m["line"] == 2 && m["content"] == "beta TODO"));
        assert!(matches.iter().all(|m| !m["file"].as_str().unwrap().ends_with(".log")));
    }

    #[tokio::test]
    async fn greps_single_file_directly() {
        let dir = fixture();
        let file = dir.path().join("a.txt");
        let out = tool()
            .execute(&json!({"path": file.to_str().unwrap(), "pattern": "^gamma$"}))
            .await;
        assert_eq!(out["count"], 1);
        assert_eq!(out["matches"][0]["line"], 3);
    }

    #[tokio::test]
    async fn max_matches_stops_early() {
        let dir = fixture();
        let out = tool()
            .execute(&json!({
                "path": dir.path().to_str().unwrap(),
                "pattern": "TODO",
                "max_matches": 1
            }))
            .await;
        assert_eq!(out["count"], 1);
    }

    #[tokio::test]
    async fn invalid_regex_is_error() {
        let dir = fixture();
        let out = tool()
            .execute(&json!({"path": dir.path().to_str().unwrap(), "pattern": "([unclosed"}))
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("regex"));
    }

    #[tokio::test]
    async fn no_matches_returns_empty() {
        let dir = fixture();
        let out = tool()
            .execute(&json!({"path": dir.path().to_str().unwrap(), "pattern": "xyzzy42"}))
            .await;
        assert_eq!(out["success"], true);
        assert_eq!(out["count"], 0);
    }

    #[tokio::test]
    async fn protected_base_is_denied() {
        let out = tool()
            .execute(&json!({"path": "/etc/ssl/private", "pattern": "x"}))
            .await;
        assert_eq!(out["success"], false);
    }
}
