// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use tracing::warn;

use crate::CheckResult;

/// Exact-path deny rules, checked first.
const EXACT_PATHS: &[&str] = &[
    "/etc/shadow",
    "/etc/gshadow",
    "/etc/sudoers",
    "/etc/security/opasswd",
    "/etc/master.passwd",
];

/// Prefix deny rules, checked second.  Anything at or below these is denied.
const PREFIX_PATHS: &[&str] = &[
    "/etc/ssl/private",
    "/var/run/secrets",
    "/run/secrets",
    "/Library/Keychains",
];

/// Regex deny rules, checked last.  These cover home-relative and
/// platform-variable locations that exact/prefix rules cannot express.
/// Matching happens against the normalized path with `/` separators.
const REGEX_PATTERNS: &[&str] = &[
    // SSH: user key directories and host private keys
    r"(^|/)\.ssh(/|$)",
    r"(^|/)ssh_host_[a-z0-9]+_key$",
    r"(^|/)id_(rsa|dsa|ecdsa|ed25519)$",
    // GPG keyrings
    r"(^|/)\.gnupg(/|$)",
    // Cloud and service credentials
    r"(^|/)\.aws/credentials$",
    r"(^|/)\.config/gcloud(/|$)",
    r"(^|/)\.netrc$",
    r"(^|/)\.pgpass$",
    r"(^|/)\.docker/config\.json$",
    r"(^|/)\.kube/config$",
    // Browser credential databases (Firefox, Chromium family)
    r"(^|/)(key[0-9]\.db|logins\.json)$",
    r"(?i)(^|/)Login Data(-journal)?$",
    // macOS keychains
    r"(?i)(^|/)Library/Keychains(/|$)",
    r"(?i)\.keychain(-db)?$",
    // Windows account database and DPAPI stores
    r"(?i)(^|/)system32/config/(sam|security|system)$",
    r"(?i)(^|/)appdata/(roaming|local)/microsoft/(credentials|protect|vault)(/|$)",
];

/// Ordered protected-path rule set: exact matches, then prefixes, then
/// regexes.  First match wins.  Immutable after construction.
#[derive(Debug)]
pub struct ProtectedPaths {
    exact: Vec<String>,
    prefixes: Vec<String>,
    regexes: Vec<(Regex, String)>,
}

impl ProtectedPaths {
    pub fn with_defaults() -> Self {
        let mut rules = Self {
            exact: EXACT_PATHS.iter().map(|s| s.to_string()).collect(),
            prefixes: PREFIX_PATHS.iter().map(|s| s.to_string()).collect(),
            regexes: Vec::new(),
        };
        for pattern in REGEX_PATTERNS {
            rules.add_regex_pattern(pattern);
        }
        rules
    }

    /// Compile and append a regex rule.  Invalid patterns are skipped with a
    /// warning — a bad overlay entry must not take the agent down.
    pub fn add_regex_pattern(&mut self, pattern: &str) {
        match Regex::new(pattern) {
            Ok(re) => self.regexes.push((re, pattern.to_string())),
            Err(e) => warn!(pattern, "skipping invalid protected-path pattern: {e}"),
        }
    }

    /// Test a path against the rule set.
    pub fn check_path(&self, path: &str) -> CheckResult {
        let normalized = normalize(path);

        for rule in &self.exact {
            if normalized == *rule {
                return CheckResult::deny("protected path", rule.clone());
            }
        }
        for rule in &self.prefixes {
            if normalized == *rule || normalized.starts_with(&format!("{rule}/")) {
                return CheckResult::deny("protected path prefix", rule.clone());
            }
        }
        for (re, rule) in &self.regexes {
            if re.is_match(&normalized) {
                return CheckResult::deny("protected path pattern", rule.clone());
            }
        }
        CheckResult::Allow
    }

    /// True if the normalized form of `text` mentions any protected path.
    /// Used by the command filter to catch `cat /etc/shadow`-style access
    /// through the shell.
    pub(crate) fn mentioned_in(&self, text: &str) -> Option<String> {
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c| c == '"' || c == '\'');
            if token.contains('/') || token.contains('\\') || token.starts_with('~') {
                if let CheckResult::Deny { matched_rule, .. } = self.check_path(token) {
                    return Some(matched_rule);
                }
            }
        }
        None
    }
}

/// Normalize a path for rule matching: trim, expand a leading `~`, convert
/// `\` separators, resolve `.` / `..` lexically, and resolve symlinks when
/// the target exists.  Symlink resolution keeps `ln -s /etc/shadow x` from
/// slipping past the exact rules; for paths that do not exist yet (writes)
/// the lexical form is authoritative.
fn normalize(path: &str) -> String {
    let trimmed = path.trim();
    let expanded = if let Some(rest) = trimmed.strip_prefix("~/") {
        dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(trimmed))
    } else {
        PathBuf::from(trimmed.replace('\\', "/"))
    };

    let resolved = std::fs::canonicalize(&expanded).unwrap_or_else(|_| lexical_resolve(&expanded));
    let text = resolved.to_string_lossy().replace('\\', "/");
    if cfg!(windows) {
        text.to_lowercase()
    } else {
        text
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn lexical_resolve(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn denies(path: &str) -> bool {
        !ProtectedPaths::with_defaults().check_path(path).is_allowed()
    }

    // ── Each default protected class must deny ────────────────────────────────

    #[test]
    fn shadow_class_files_deny() {
        assert!(denies("/etc/shadow"));
        assert!(denies("/etc/gshadow"));
        assert!(denies("/etc/sudoers"));
        assert!(denies("/etc/master.passwd"));
    }

    #[test]
    fn ssh_key_material_denies() {
        assert!(denies("/home/alice/.ssh/id_rsa"));
        assert!(denies("/home/alice/.ssh"));
        assert!(denies("/root/.ssh/authorized_keys"));
        assert!(denies("/etc/ssh/ssh_host_ed25519_key"));
        assert!(denies("/backup/id_ed25519"));
    }

    #[test]
    fn tls_private_keys_deny() {
        assert!(denies("/etc/ssl/private/server.key"));
        assert!(denies("/etc/ssl/private"));
    }

    #[test]
    fn gpg_and_cloud_credentials_deny() {
        assert!(denies("/home/bob/.gnupg/secring.gpg"));
        assert!(denies("/home/bob/.aws/credentials"));
        assert!(denies("/home/bob/.config/gcloud/credentials.db"));
        assert!(denies("/home/bob/.netrc"));
        assert!(denies("/home/bob/.pgpass"));
        assert!(denies("/home/bob/.kube/config"));
        assert!(denies("/home/bob/.docker/config.json"));
    }

    #[test]
    fn browser_credential_databases_deny() {
        assert!(denies("/home/c/.mozilla/firefox/x9.default/key4.db"));
        assert!(denies("/home/c/.mozilla/firefox/x9.default/logins.json"));
        assert!(denies("/home/c/.config/google-chrome/Default/Login Data"));
        assert!(denies("/home/c/.config/chromium/Default/Login Data-journal"));
    }

    #[test]
    fn os_keychains_deny() {
        assert!(denies("/Users/dee/Library/Keychains/login.keychain-db"));
        assert!(denies("/Library/Keychains/System.keychain"));
        assert!(denies("/tmp/export.keychain"));
    }

    #[test]
    fn service_account_tokens_deny() {
        assert!(denies("/var/run/secrets/kubernetes.io/serviceaccount/token"));
        assert!(denies("/run/secrets/db_password"));
    }

    #[test]
    fn windows_account_stores_deny() {
        assert!(denies(r"C:\Windows\System32\config\SAM"));
        assert!(denies(r"C:\Users\e\AppData\Roaming\Microsoft\Credentials\blob"));
        assert!(denies(r"C:\Users\e\AppData\Roaming\Microsoft\Protect\S-1-5-21\key"));
    }

    // ── Rule ordering and normalization ──────────────────────────────────────

    #[test]
    fn ordinary_paths_allow() {
        assert!(!denies("/etc/hostname"));
        assert!(!denies("/home/alice/project/src/main.rs"));
        assert!(!denies("/etc/ssl/certs/ca-bundle.crt"));
        assert!(!denies("/home/alice/sshnotes.txt"));
    }

    #[test]
    fn dot_dot_traversal_is_resolved_before_matching() {
        assert!(denies("/etc/passwd/../shadow"));
        assert!(denies("/tmp/../etc/shadow"));
    }

    #[test]
    fn current_dir_components_are_resolved() {
        assert!(denies("/etc/./shadow"));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert!(denies("  /etc/shadow  "));
    }

    #[test]
    fn prefix_rule_does_not_match_sibling_names() {
        // /run/secrets-backup is a different directory from /run/secrets.
        assert!(!denies("/run/secrets-backup/file"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_to_protected_target_denies() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("innocent.txt");
        std::os::unix::fs::symlink("/etc/shadow", &link).unwrap();
        assert!(denies(link.to_str().unwrap()));
    }

    #[test]
    fn invalid_overlay_regex_is_skipped() {
        let mut rules = ProtectedPaths::with_defaults();
        let before = rules.regexes.len();
        rules.add_regex_pattern("([unclosed");
        assert_eq!(rules.regexes.len(), before);
    }

    // ── mentioned_in ──────────────────────────────────────────────────────────

    #[test]
    fn mentioned_in_finds_protected_token() {
        let rules = ProtectedPaths::with_defaults();
        assert!(rules.mentioned_in("cat /etc/shadow").is_some());
        assert!(rules.mentioned_in("tar cf - /home/a/.ssh | gzip").is_some());
        assert!(rules.mentioned_in("ls -la /tmp").is_none());
    }

    #[test]
    fn mentioned_in_strips_quotes() {
        let rules = ProtectedPaths::with_defaults();
        assert!(rules.mentioned_in("cat '/etc/shadow'").is_some());
        assert!(rules.mentioned_in("cat \"/etc/shadow\"").is_some());
    }
}
