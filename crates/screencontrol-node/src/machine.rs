// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Machine lock/info operations handled inline by the dispatcher.  These are
//! service-side responsibilities: locking must work even when no user
//! session helper is running, and `machine_info` reports service state the
//! helper cannot see.

use serde_json::{json, Value};

use screencontrol_tools::builtin::system_info;
use screencontrol_tools::{err, ok};

/// Lock the interactive session using the platform's locker.
pub async fn lock() -> Value {
    let attempts: &[(&str, &[&str])] = lock_commands();
    for (cmd, args) in attempts {
        let status = tokio::process::Command::new(cmd)
            .args(*args)
            .stdin(std::process::Stdio::null())
            .status()
            .await;
        if matches!(status, Ok(s) if s.success()) {
            return ok(json!({ "message": "Machine locked" }));
        }
    }
    err("Failed to lock machine")
}

fn lock_commands() -> &'static [(&'static str, &'static [&'static str])] {
    #[cfg(target_os = "macos")]
    {
        &[(
            "/System/Library/CoreServices/Menu Extras/User.menu/Contents/Resources/CGSession",
            &["-suspend"],
        )]
    }
    #[cfg(target_os = "windows")]
    {
        &[("rundll32.exe", &["user32.dll,LockWorkStation"])]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        &[
            ("loginctl", &["lock-session"]),
            ("xdg-screensaver", &["lock"]),
            ("gnome-screensaver-command", &["-l"]),
        ]
    }
}

/// Extended system info with lock and service state.
pub async fn info(agent_version: &str) -> Value {
    let (total_mb, free_mb) = system_info::memory_mb();
    ok(json!({
        "os": system_info::os_pretty_name(),
        "osType": system_info::os_type(),
        "osVersion": system_info::os_version(),
        "architecture": std::env::consts::ARCH,
        "hostname": system_info::hostname(),
        "memoryTotal": total_mb,
        "memoryFree": free_mb,
        "isScreenLocked": system_info::is_screen_locked().await,
        "serviceVersion": agent_version,
        "serviceRunningAsRoot": running_as_root(),
    }))
}

fn running_as_root() -> bool {
    #[cfg(unix)]
    {
        // Safety: geteuid has no failure mode.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn info_reports_lock_and_service_fields() {
        let out = info("9.9.9").await;
        assert_eq!(out["success"], true);
        assert_eq!(out["serviceVersion"], "9.9.9");
        assert!(out.get("isScreenLocked").is_some());
        assert!(out.get("serviceRunningAsRoot").is_some());
        assert!(out.get("hostname").is_some());
    }
}
