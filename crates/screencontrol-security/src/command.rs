// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use regex::Regex;
use tracing::warn;

use crate::{paths::ProtectedPaths, CheckResult};

/// Executable names that are denied outright regardless of arguments.
/// Matched against the leading token's basename, case-insensitively and
/// with any `.exe`/`.py` suffix stripped.
const BLOCKED_EXECUTABLES: &[&str] = &[
    "mimikatz",
    "lazagne",
    "pypykatz",
    "secretsdump",
    "hashdump",
    "keychaindump",
    "chainbreaker",
];

/// Command-line patterns for credential dumps that hide behind otherwise
/// legitimate system binaries.
const BLOCKED_PATTERNS: &[&str] = &[
    // macOS keychain CLI misuse
    r"(?i)\bsecurity\s+(dump-keychain|find-generic-password|find-internet-password)",
    // Windows credential stores
    r"(?i)\bcmdkey\s+/list",
    r"(?i)\bvaultcmd\b",
    r"(?i)\brundll32\b.*\bkeymgr\.dll",
    r"(?i)\breg(\.exe)?\s+(save|export)\s+hk(lm|ey_local_machine)[\\/](sam|security|system)\b",
    r"(?i)\bntdsutil\b",
    r"(?i)\besentutl\b.*\bntds\b",
    // lsass process dumps
    r"(?i)\bprocdump\b.*\blsass\b",
];

/// Exfiltration shapes: encode-then-upload chains and uploads whose command
/// line names a credential-bearing location (the latter is checked against
/// the protected-path rules at call time).
const EXFIL_PATTERNS: &[&str] = &[
    r"(?i)\bbase64\b.*\|.*\b(curl|wget|nc|ncat)\b",
    r"(?i)\b(xxd|od)\b.*\|.*\b(curl|wget)\b",
];

/// Ordered command deny rules.  Immutable after construction.
#[derive(Debug)]
pub struct CommandFilter {
    blocked_executables: Vec<String>,
    blocked_patterns: Vec<(Regex, String)>,
    exfil_patterns: Vec<(Regex, String)>,
}

impl CommandFilter {
    pub fn with_defaults() -> Self {
        let mut filter = Self {
            blocked_executables: BLOCKED_EXECUTABLES.iter().map(|s| s.to_string()).collect(),
            blocked_patterns: Vec::new(),
            exfil_patterns: Vec::new(),
        };
        for pattern in BLOCKED_PATTERNS {
            filter.add_blocked_pattern(pattern);
        }
        for pattern in EXFIL_PATTERNS {
            match Regex::new(pattern) {
                Ok(re) => filter.exfil_patterns.push((re, pattern.to_string())),
                Err(e) => warn!(pattern, "skipping invalid exfiltration pattern: {e}"),
            }
        }
        filter
    }

    /// Compile and append a blocked-command regex.  Invalid patterns are
    /// skipped with a warning.
    pub fn add_blocked_pattern(&mut self, pattern: &str) {
        match Regex::new(pattern) {
            Ok(re) => self.blocked_patterns.push((re, pattern.to_string())),
            Err(e) => warn!(pattern, "skipping invalid command pattern: {e}"),
        }
    }

    /// Test a full command line against the deny rules.
    pub fn check_command(&self, cmdline: &str, paths: &ProtectedPaths) -> CheckResult {
        let cmdline = cmdline.trim();
        if cmdline.is_empty() {
            return CheckResult::Allow;
        }

        if let Some(rule) = self.blocked_executable(cmdline) {
            return CheckResult::deny("credential dump tool", rule);
        }
        for (re, rule) in &self.blocked_patterns {
            if re.is_match(cmdline) {
                return CheckResult::deny("credential access command", rule.clone());
            }
        }
        for (re, rule) in &self.exfil_patterns {
            if re.is_match(cmdline) {
                return CheckResult::deny("exfiltration pattern", rule.clone());
            }
        }
        // Covers both direct reads (`cat /etc/shadow`) and uploads whose
        // command line names a credential-bearing location.
        if let Some(rule) = paths.mentioned_in(cmdline) {
            return CheckResult::deny("command references protected path", rule);
        }
        CheckResult::Allow
    }

    /// Extract the leading executable token (quote-stripped, basename only,
    /// suffix-stripped) and test it against the blocked list.
    fn blocked_executable(&self, cmdline: &str) -> Option<String> {
        let first = cmdline.split_whitespace().next()?;
        let first = first.trim_matches(|c| c == '"' || c == '\'');
        let base = first
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(first)
            .to_lowercase();
        let base = base
            .strip_suffix(".exe")
            .or_else(|| base.strip_suffix(".py"))
            .unwrap_or(&base);

        self.blocked_executables
            .iter()
            .find(|blocked| base == blocked.as_str())
            .cloned()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
