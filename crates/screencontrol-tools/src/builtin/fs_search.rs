// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use tracing::debug;
use walkdir::WalkDir;

use screencontrol_security::SecurityGate;

use crate::tool::{err, ok, Tool};

/// Find files under a base directory by glob pattern.
///
/// Glob semantics: `*` matches any run of characters within one path
/// component, `?` matches a single character, and a `**` anywhere in the
/// pattern turns the walk recursive.  Matching is against the file name and
/// is case-insensitive on Windows, case-sensitive elsewhere.
pub struct FsSearchTool {
    pub gate: Arc<SecurityGate>,
}

#[async_trait]
impl Tool for FsSearchTool {
    fn name(&self) -> &str {
        "fs_search"
    }

    fn description(&self) -> &str {
        "Search files by glob pattern (e.g. '*.txt', '**/*.rs'). '**' makes the \
         walk recursive; otherwise only the base directory is scanned."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Base path" },
                "pattern": { "type": "string", "description": "Glob pattern (e.g. *.txt)" },
                "max_results": { "type": "number", "description": "Maximum results (default 100)" }
            },
            "required": ["path", "pattern"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(base) = params.get("path").and_then(|v| v.as_str()).map(str::trim) else {
            return err("missing 'path'");
        };
        let pattern = params
            .get("pattern")
            .and_then(|v| v.as_str())
            .unwrap_or("*");
        let max_results = params
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(100) as usize;

        if !self.gate.check_path(base).is_allowed() {
            return err("Access denied: protected path");
        }
        if !std::path::Path::new(base).exists() {
            return err(format!("Path does not exist: {base}"));
        }
        debug!(base, pattern, max_results, "fs_search");

        match walk_matches(self.gate.clone(), base, pattern, max_results).await {
            Ok(matches) => {
                let count = matches.len();
                ok(json!({ "matches": matches, "count": count }))
            }
            Err(e) => err(e),
        }
    }
}

/// Walk `base` collecting files whose name matches the glob, skipping
/// anything the gate hides.  Shared with `fs_grep`.
pub(crate) async fn walk_matches(
    gate: Arc<SecurityGate>,
    base: &str,
    pattern: &str,
    max_results: usize,
) -> Result<Vec<String>, String> {
    let Some(re) = glob_to_regex(name_pattern(pattern)) else {
        return Err(format!("invalid glob pattern: {pattern}"));
    };
    let recursive = pattern.contains("**");
    let base = base.to_string();

    let result = tokio::task::spawn_blocking(move || {
        let depth = if recursive { usize::MAX } else { 1 };
        let mut matches = Vec::new();
        let walker = WalkDir::new(&base)
            .min_depth(1)
            .max_depth(depth)
            .into_iter()
            .filter_entry(|e| !gate.should_hide(&e.path().to_string_lossy()));

        for entry in walker.filter_map(Result::ok) {
            if matches.len() >= max_results {
                break;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            if re.is_match(&entry.file_name().to_string_lossy()) {
                matches.push(entry.path().to_string_lossy().into_owned());
            }
        }
        matches
    })
    .await;

    result.map_err(|e| format!("Search failed: {e}"))
}

/// Reduce a glob to its file-name part: the walk handles recursion, so a
/// leading `**/` or any directory prefix is stripped before matching.
fn name_pattern(pattern: &str) -> &str {
    pattern.rsplit('/').next().unwrap_or(pattern)
}

/// Compile a component glob (`*`, `?`) to an anchored [`Regex`].
/// Case-insensitive on Windows.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    RegexBuilder::new(&re)
        .case_insensitive(cfg!(windows))
        .build()
        .ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> FsSearchTool {
        FsSearchTool {
            gate: Arc::new(SecurityGate::with_defaults()),
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "n").unwrap();
        std::fs::write(dir.path().join("data.csv"), "d").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/deep.txt"), "x").unwrap();
        dir
    }

    // ── Glob compiler ─────────────────────────────────────────────────────────

    #[test]
    fn star_matches_within_component() {
        let re = glob_to_regex("*.txt").unwrap();
        assert!(re.is_match("notes.txt"));
        assert!(!re.is_match("notes.csv"));
        assert!(!re.is_match("sub/deep.txt"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let re = glob_to_regex("f?.rs").unwrap();
        assert!(re.is_match("f1.rs"));
        assert!(!re.is_match("f12.rs"));
    }

    #[test]
    fn literal_dots_are_escaped() {
        let re = glob_to_regex("a.b").unwrap();
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("axb"));
    }

    #[test]
    fn name_pattern_strips_directory_prefixes() {
        assert_eq!(name_pattern("**/*.rs"), "*.rs");
        assert_eq!(name_pattern("src/**/*.rs"), "*.rs");
        assert_eq!(name_pattern("*.rs"), "*.rs");
    }

    // ── Search behavior ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn flat_search_finds_top_level_only() {
        let dir = fixture();
        let out = tool()
            .execute(&json!({"path": dir.path().to_str().unwrap(), "pattern": "*.txt"}))
            .await;
        assert_eq!(out["success"], true, "{out}");
        assert_eq!(out["count"], 1);
        assert!(out["matches"][0].as_str().unwrap().ends_with("notes.txt"));
    }

    #[tokio::test]
    async fn double_star_search_recurses() {
        let dir = fixture();
        let out = tool()
            .execute(&json!({"path": dir.path().to_str().unwrap(), "pattern": "**/*.txt"}))
            .await;
        assert_eq!(out["count"], 2);
    }

    #[tokio::test]
    async fn max_results_caps_matches() {
        let dir = fixture();
        let out = tool()
            .execute(&json!({
                "path": dir.path().to_str().unwrap(),
                "pattern": "**/*",
                "max_results": 1
            }))
            .await;
        assert_eq!(out["count"], 1);
    }

    #[tokio::test]
    async fn no_match_returns_empty_list() {
        let dir = fixture();
        let out = tool()
            .execute(&json!({"path": dir.path().to_str().unwrap(), "pattern": "*.elf"}))
            .await;
        assert_eq!(out["success"], true);
        assert_eq!(out["count"], 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn denied_subtrees_are_skipped_silently() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".ssh")).unwrap();
        std::fs::write(dir.path().join(".ssh/id_rsa"), "KEY").unwrap();
        std::fs::write(dir.path().join("plain.txt"), "x").unwrap();

        let out = tool()
            .execute(&json!({"path": dir.path().to_str().unwrap(), "pattern": "**/*"}))
            .await;
        assert_eq!(out["success"], true);
        let matches = out["matches"].as_array().unwrap();
        assert!(matches.iter().all(|m| !m.as_str().unwrap().contains("id_rsa")));
        assert_eq!(out["count"], 1);
    }

    #[tokio::test]
    async fn search_protected_base_is_denied() {
        let out = tool()
            .execute(&json!({"path": "/etc/ssl/private", "pattern": "*"}))
            .await;
        assert_eq!(out["success"], false);
    }

    #[tokio::test]
    async fn missing_base_is_error() {
        let out = tool()
            .execute(&json!({"path": "/tmp/screencontrol_missing_base", "pattern": "*"}))
            .await;
        assert_eq!(out["success"], false);
    }
}
