// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so enabled-by-default fields need a named function.
fn default_true() -> bool {
    true
}

fn default_http_port() -> u16 {
    3456
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gui_bridge_port() -> u16 {
    3457
}

fn default_session_idle_timeout() -> u64 {
    3600
}

/// Agent configuration, persisted as JSON with camelCase keys.
///
/// Loaded once at startup; mutated only through an explicit settings write
/// (`POST /settings`), which merges a patch and saves the result.  Readers
/// hold cloned snapshots, so a stale view during a concurrent settings write
/// is acceptable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Port for the local REST surface.
    pub http_port: u16,
    /// Bind address for the local REST surface.  Widening beyond loopback
    /// requires `apiKey` to be set; the server enforces bearer auth then.
    pub http_host: String,
    /// Port the user-session GUI helper listens on (loopback only).
    pub gui_bridge_port: u16,
    /// `wss://…/ws` control-server URL; empty disables the control channel.
    pub control_server_url: String,
    /// Human-readable agent name shown in the control-server UI.
    pub agent_name: String,
    pub customer_id: String,
    pub license_uuid: String,
    pub auto_start: bool,
    #[serde(rename = "enableLogging")]
    pub logging_enabled: bool,
    /// Bearer token for non-loopback REST access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Idle shell sessions older than this are stopped and reaped.
    pub session_idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            http_host: default_http_host(),
            gui_bridge_port: default_gui_bridge_port(),
            control_server_url: String::new(),
            agent_name: String::new(),
            customer_id: String::new(),
            license_uuid: String::new(),
            auto_start: false,
            logging_enabled: default_true(),
            api_key: None,
            session_idle_timeout_secs: default_session_idle_timeout(),
        }
    }
}

impl Config {
    /// Apply a settings patch (a JSON object of camelCase keys).
    ///
    /// Only recognized keys are accepted; an unknown key rejects the whole
    /// patch so a typo cannot silently vanish.
    pub fn merge(&mut self, patch: &serde_json::Value) -> anyhow::Result<()> {
        let obj = patch
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("settings patch must be a JSON object"))?;

        for (key, value) in obj {
            match key.as_str() {
                "httpPort" => self.http_port = as_port(value, key)?,
                "httpHost" => self.http_host = as_str(value, key)?,
                "guiBridgePort" => self.gui_bridge_port = as_port(value, key)?,
                "controlServerUrl" => self.control_server_url = as_str(value, key)?,
                "agentName" => self.agent_name = as_str(value, key)?,
                "customerId" => self.customer_id = as_str(value, key)?,
                "licenseUuid" => self.license_uuid = as_str(value, key)?,
                "autoStart" => self.auto_start = as_bool(value, key)?,
                "enableLogging" => self.logging_enabled = as_bool(value, key)?,
                "apiKey" => {
                    self.api_key = match value {
                        serde_json::Value::Null => None,
                        other => Some(as_str(other, key)?),
                    }
                }
                "sessionIdleTimeoutSecs" => {
                    self.session_idle_timeout_secs = value
                        .as_u64()
                        .ok_or_else(|| anyhow::anyhow!("'{key}' must be a non-negative integer"))?
                }
                other => anyhow::bail!("Unknown setting key: {other}"),
            }
        }
        Ok(())
    }

    /// True when the REST surface is bound to a loopback address.
    pub fn binds_loopback(&self) -> bool {
        matches!(self.http_host.as_str(), "127.0.0.1" | "::1" | "localhost")
    }
}

fn as_str(value: &serde_json::Value, key: &str) -> anyhow::Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("'{key}' must be a string"))
}

fn as_bool(value: &serde_json::Value, key: &str) -> anyhow::Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| anyhow::anyhow!("'{key}' must be a boolean"))
}

fn as_port(value: &serde_json::Value, key: &str) -> anyhow::Result<u16> {
    value
        .as_u64()
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)
        .ok_or_else(|| anyhow::anyhow!("'{key}' must be a port number (1-65535)"))
}

/// Optional developer overlay stored next to the main config as
/// `debug-config.json`.  Carries the control-server URL and registration
/// identifiers so a development server can be targeted without touching the
/// installed configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebugConfig {
    pub server_url: String,
    pub endpoint_uuid: String,
    pub customer_id: String,
    pub connect_on_startup: bool,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
