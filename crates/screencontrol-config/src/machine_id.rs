// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Stable per-host identifier used to register with the control server.
//!
//! Derivation order of preference:
//!
//! 1. `/etc/machine-id` (systemd hosts)
//! 2. `/var/lib/dbus/machine-id`
//! 3. Windows registry `HKLM\SOFTWARE\Microsoft\Cryptography\MachineGuid`
//! 4. macOS `IOPlatformUUID`
//! 5. `<hostname>-<platform>` fallback
//!
//! Derived once per process lifetime and cached.

use std::sync::OnceLock;

static MACHINE_ID: OnceLock<String> = OnceLock::new();

/// The cached per-host machine id.
pub fn machine_id() -> &'static str {
    MACHINE_ID.get_or_init(derive)
}

fn derive() -> String {
    platform_machine_id().unwrap_or_else(|| format!("{}-{}", hostname(), std::env::consts::OS))
}

pub(crate) fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(target_os = "linux")]
fn platform_machine_id() -> Option<String> {
    read_id_file("/etc/machine-id").or_else(|| read_id_file("/var/lib/dbus/machine-id"))
}

#[cfg(target_os = "windows")]
fn platform_machine_id() -> Option<String> {
    // `reg query` keeps us off a registry crate; the value format is stable.
    let output = std::process::Command::new("reg")
        .args([
            "query",
            r"HKLM\SOFTWARE\Microsoft\Cryptography",
            "/v",
            "MachineGuid",
        ])
        .output()
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .find(|l| l.contains("MachineGuid"))
        .and_then(|l| l.split_whitespace().last())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

#[cfg(target_os = "macos")]
fn platform_machine_id() -> Option<String> {
    let output = std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .find(|l| l.contains("IOPlatformUUID"))
        .and_then(|l| l.split('"').nth(3))
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
fn platform_machine_id() -> Option<String> {
    None
}

#[cfg(target_os = "linux")]
fn read_id_file(path: &str) -> Option<String> {
    let id = std::fs::read_to_string(path).ok()?;
    let id = id.trim().to_string();
    (!id.is_empty()).then_some(id)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
