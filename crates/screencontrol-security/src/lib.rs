// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Security gate — the single choke point every filesystem path and shell
//! command passes through before any I/O happens.
//!
//! The gate is a pure decision layer: rule sets are built once at startup
//! (embedded defaults plus an optional `security.json` overlay) and are
//! immutable afterwards, so callers need no locking.  Denials are logged as
//! structured events on the `audit` tracing target
//! (`blocked_file_access` / `blocked_command`).
//!
//! # `security.json`
//!
//! ```json
//! {
//!   "protectedPaths":  ["(^|/)\\.mysecrets(/|$)"],
//!   "blockedCommands": ["(?i)dump-secrets"]
//! }
//! ```
//!
//! Overlay entries are regular expressions; entries that fail to compile are
//! skipped with a warning rather than taking the agent down.

mod command;
mod paths;

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

pub use command::CommandFilter;
pub use paths::ProtectedPaths;

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Allow,
    Deny {
        reason: String,
        /// The rule text that matched, for the audit trail.
        matched_rule: String,
    },
}

impl CheckResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CheckResult::Allow)
    }

    pub fn deny(reason: impl Into<String>, rule: impl Into<String>) -> Self {
        CheckResult::Deny {
            reason: reason.into(),
            matched_rule: rule.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SecurityOverlay {
    protected_paths: Vec<String>,
    blocked_commands: Vec<String>,
}

/// The complete gate: protected paths plus the command filter.
///
/// Tool handlers hold one `Arc<SecurityGate>` and call [`check_path`] /
/// [`check_command`] before touching the filesystem or spawning a child.
///
/// [`check_path`]: SecurityGate::check_path
/// [`check_command`]: SecurityGate::check_command
#[derive(Debug)]
pub struct SecurityGate {
    paths: ProtectedPaths,
    commands: CommandFilter,
}

impl SecurityGate {
    /// Gate with the embedded default rule set only.
    pub fn with_defaults() -> Self {
        Self {
            paths: ProtectedPaths::with_defaults(),
            commands: CommandFilter::with_defaults(),
        }
    }

    /// Gate with defaults plus the `security.json` overlay, when present.
    pub fn load(security_json: Option<&Path>) -> Self {
        let mut gate = Self::with_defaults();
        let Some(path) = security_json.filter(|p| p.is_file()) else {
            return gate;
        };

        let overlay = std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str::<SecurityOverlay>(&text).map_err(Into::into));
        match overlay {
            Ok(overlay) => {
                for pattern in &overlay.protected_paths {
                    gate.paths.add_regex_pattern(pattern);
                }
                for pattern in &overlay.blocked_commands {
                    gate.commands.add_blocked_pattern(pattern);
                }
            }
            Err(e) => warn!(path = %path.display(), "ignoring security overlay: {e}"),
        }
        gate
    }

    /// Decide whether a filesystem path may be touched.  Denials are logged.
    pub fn check_path(&self, path: &str) -> CheckResult {
        let result = self.paths.check_path(path);
        if let CheckResult::Deny { reason, matched_rule } = &result {
            warn!(
                target: "audit",
                event = "blocked_file_access",
                path,
                reason = %reason,
                rule = %matched_rule,
            );
        }
        result
    }

    /// Listing filter — used to silently drop protected children from
    /// directory listings.  Never logs and never errors.
    pub fn should_hide(&self, path: &str) -> bool {
        !self.paths.check_path(path).is_allowed()
    }

    /// Decide whether a shell command line may run.  Denials are logged.
    pub fn check_command(&self, cmdline: &str) -> CheckResult {
        let result = self.commands.check_command(cmdline, &self.paths);
        if let CheckResult::Deny { reason, matched_rule } = &result {
            warn!(
                target: "audit",
                event = "blocked_command",
                command = cmdline,
                reason = %reason,
                rule = %matched_rule,
            );
        }
        result
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
