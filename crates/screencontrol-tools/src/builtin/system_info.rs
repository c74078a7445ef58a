// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! System information tool plus the host-probe helpers shared with the
//! control-channel registration (cpu model, MAC addresses, screen-lock
//! detection for the heartbeat).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{ok, Tool};

/// Report OS, CPU, memory and uptime details.
pub struct SystemInfoTool;

#[async_trait]
impl Tool for SystemInfoTool {
    fn name(&self) -> &str {
        "system_info"
    }

    fn description(&self) -> &str {
        "Get system information (OS, version, architecture, hostname, CPU, memory, uptime)."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: &Value) -> Value {
        let (total_mb, free_mb) = memory_mb();
        let uptime = uptime_seconds();
        ok(json!({
            "os": os_pretty_name(),
            "osType": os_type(),
            "osVersion": os_version(),
            "architecture": std::env::consts::ARCH,
            "hostname": hostname(),
            "cpu": cpu_model(),
            "cpuCores": cpu_cores(),
            "memoryTotal": total_mb,
            "memoryUsed": total_mb.saturating_sub(free_mb),
            "memoryFree": free_mb,
            "uptime": format_uptime(uptime),
            "uptimeSeconds": uptime,
        }))
    }
}

pub fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Wire value for the `osType` registration field.
pub fn os_type() -> &'static str {
    match std::env::consts::OS {
        "macos" => "macos",
        "windows" => "windows",
        _ => "linux",
    }
}

/// Distribution / product name, e.g. "Debian GNU/Linux 12 (bookworm)".
pub fn os_pretty_name() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(text) = std::fs::read_to_string("/etc/os-release") {
            for line in text.lines() {
                if let Some(name) = line.strip_prefix("PRETTY_NAME=") {
                    return name.trim_matches('"').to_string();
                }
            }
        }
        "Linux".to_string()
    }
    #[cfg(target_os = "macos")]
    {
        format!("macOS {}", os_version())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        "Windows".to_string()
    }
}

pub fn os_version() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sw_vers")
            .arg("-productVersion")
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        "unknown".to_string()
    }
}

pub fn cpu_model() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(text) = std::fs::read_to_string("/proc/cpuinfo") {
            for line in text.lines() {
                if line.starts_with("model name") {
                    if let Some((_, model)) = line.split_once(':') {
                        return model.trim().to_string();
                    }
                }
            }
        }
        "Unknown CPU".to_string()
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sysctl")
            .args(["-n", "machdep.cpu.brand_string"])
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Unknown CPU".to_string())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        "Unknown CPU".to_string()
    }
}

pub fn cpu_cores() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// (total, available) memory in MB.  Best effort; (0, 0) when unknown.
pub fn memory_mb() -> (u64, u64) {
    #[cfg(target_os = "linux")]
    {
        let mut total = 0;
        let mut free = 0;
        if let Ok(text) = std::fs::read_to_string("/proc/meminfo") {
            for line in text.lines() {
                let kb = |l: &str| {
                    l.split_whitespace()
                        .nth(1)
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0)
                };
                if line.starts_with("MemTotal:") {
                    total = kb(line) / 1024;
                } else if line.starts_with("MemAvailable:") {
                    free = kb(line) / 1024;
                }
            }
        }
        (total, free)
    }
    #[cfg(not(target_os = "linux"))]
    {
        (0, 0)
    }
}

pub fn uptime_seconds() -> u64 {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/uptime")
            .ok()
            .and_then(|s| s.split_whitespace().next().map(str::to_string))
            .and_then(|s| s.parse::<f64>().ok())
            .map(|f| f as u64)
            .unwrap_or(0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// "N days, H:MM" shape, days omitted when zero.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        let plural = if days == 1 { "" } else { "s" };
        format!("{days} day{plural}, {hours}:{minutes:02}")
    } else {
        format!("{hours}:{minutes:02}")
    }
}

/// MAC addresses for the registration fingerprint (loopback excluded).
pub fn mac_addresses() -> Vec<String> {
    #[cfg(target_os = "linux")]
    {
        let mut addrs = Vec::new();
        if let Ok(entries) = std::fs::read_dir("/sys/class/net") {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == "lo" {
                    continue;
                }
                if let Ok(addr) = std::fs::read_to_string(entry.path().join("address")) {
                    let addr = addr.trim().to_string();
                    if !addr.is_empty() && addr != "00:00:00:00:00:00" {
                        addrs.push(addr);
                    }
                }
            }
        }
        addrs.sort();
        addrs
    }
    #[cfg(not(target_os = "linux"))]
    {
        Vec::new()
    }
}

/// Best-effort screen-lock probe, piggybacked on the heartbeat.
pub async fn is_screen_locked() -> bool {
    #[cfg(target_os = "linux")]
    {
        tokio::process::Command::new("pgrep")
            .args(["-x", "gnome-screensaver|xscreensaver|i3lock|swaylock"])
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
