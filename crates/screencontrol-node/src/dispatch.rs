// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Tool dispatcher — routes a `(method, params)` pair to the right handler.
//!
//! This is the single point where the split-process reality is encoded:
//! filesystem, shell and system tools execute in this (privileged) process
//! via the registry; GUI methods require the interactive session's display
//! connection and are proxied to the user-session helper through the
//! GUI bridge client.  MCP meta methods, health checks and machine
//! lock/unlock are handled inline.
//!
//! Both transports feed the same [`ToolInvocation`] shape: the HTTP server
//! with `request_id: None` (the reply is synchronous), the control channel
//! with the server-issued id (the reply echoes it).

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tracing::{debug, warn};

use screencontrol_tools::{err, ok, ToolRegistry};

use crate::bridge::GuiBridgeClient;
use crate::machine;

/// A uniform tool invocation produced by either transport.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// `None` for HTTP (synchronous reply); the server-issued id for the
    /// control channel.
    pub request_id: Option<String>,
    pub method: String,
    pub params: Value,
}

/// Dispatch outcome.  `gui_bridge_down` lets the HTTP layer answer 502 for
/// an unreachable helper while the control channel sends the error payload
/// as a normal response.
#[derive(Debug)]
pub struct Dispatch {
    pub result: Value,
    pub gui_bridge_down: bool,
}

impl Dispatch {
    fn done(result: Value) -> Self {
        Self { result, gui_bridge_down: false }
    }

    fn bridge_down(result: Value) -> Self {
        Self { result, gui_bridge_down: true }
    }
}

/// Methods that must run in the user session and are proxied through the
/// GUI bridge (canonical names, after alias resolution).
const GUI_METHODS: &[&str] = &[
    "screenshot",
    "screenshot_app",
    "desktop_screenshot",
    "mouse_click",
    "click_absolute",
    "doubleClick",
    "clickElement",
    "mouse_move",
    "mouse_scroll",
    "mouse_drag",
    "drag",
    "keyboard_type",
    "keyboard_press",
    "keyboard_shortcut",
    "getClickableElements",
    "getUIElements",
    "getMousePosition",
    "getActiveWindow",
    "analyzeWithOCR",
    "listApplications",
    "focusApplication",
    "launchApplication",
    "app_launch",
    "closeApp",
    "app_quit",
    "window_list",
    "window_focus",
    "window_move",
    "window_resize",
];

/// Normalize the historical dual naming to canonical method names.
fn canonical(method: &str) -> &str {
    match method {
        "listDirectory" => "fs_list",
        "readFile" => "fs_read",
        "writeFile" => "fs_write",
        "deleteFile" => "fs_delete",
        "moveFile" => "fs_move",
        "executeCommand" => "shell_exec",
        "click" => "mouse_click",
        "moveMouse" => "mouse_move",
        "scroll" | "scrollMouse" => "mouse_scroll",
        "typeText" => "keyboard_type",
        "pressKey" => "keyboard_press",
        "lockMachine" => "machine_lock",
        "unlockMachine" => "machine_unlock",
        "getMachineInfo" => "machine_info",
        other => other,
    }
}

pub struct Dispatcher {
    registry: ToolRegistry,
    bridge: GuiBridgeClient,
    agent_version: String,
    /// Pending unlock request for the credential-provider hook endpoints.
    /// Memory-only by design; the provider's own semantics are opaque here.
    pending_unlock: Arc<Mutex<Option<Value>>>,
}

impl Dispatcher {
    pub fn new(
        registry: ToolRegistry,
        bridge: GuiBridgeClient,
        agent_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            bridge,
            agent_version: agent_version.into(),
            pending_unlock: Arc::new(Mutex::new(None)),
        }
    }

    /// Shared handle for the credential-provider HTTP endpoints.
    pub fn pending_unlock(&self) -> Arc<Mutex<Option<Value>>> {
        self.pending_unlock.clone()
    }

    /// Route one invocation.  Never panics past this boundary: every path
    /// resolves to a `ToolResult` JSON object.
    pub async fn dispatch(&self, invocation: ToolInvocation) -> Dispatch {
        let method = canonical(&invocation.method);
        debug!(method, original = %invocation.method, "dispatching");

        match method {
            // MCP meta-set
            "tools/list" => Dispatch::done(self.tools_list()),
            "prompts/list" => Dispatch::done(json!({ "prompts": [] })),
            "resources/list" => Dispatch::done(json!({ "resources": [] })),

            // Health probes
            "health" | "ping" => Dispatch::done(json!({ "status": "ok", "service": true })),

            // Machine control (service-side, works while the session is locked)
            "machine_lock" => Dispatch::done(machine::lock().await),
            "machine_unlock" => Dispatch::done(self.queue_unlock(&invocation.params)),
            "machine_info" => Dispatch::done(machine::info(&self.agent_version).await),

            m if GUI_METHODS.contains(&m) => match self.bridge.forward(m, &invocation.params).await
            {
                Ok(result) => Dispatch::done(result),
                Err(e) => {
                    warn!(method = m, "GUI bridge unreachable: {e}");
                    Dispatch::bridge_down(err(format!("GUI bridge not available: {e}")))
                }
            },

            m => Dispatch::done(self.registry.execute(m, &invocation.params).await),
        }
    }

    /// Queue an unlock request for the out-of-process credential provider,
    /// which polls the service for pending commands.
    fn queue_unlock(&self, params: &Value) -> Value {
        let password = params.get("password").and_then(|v| v.as_str());
        if password.map_or(true, str::is_empty) {
            return err("Password is required for unlock");
        }
        *self.pending_unlock.lock().unwrap() = Some(json!({
            "username": params.get("username").and_then(|v| v.as_str()).unwrap_or(""),
            "password": password.unwrap(),
        }));
        ok(json!({ "message": "Unlock command queued" }))
    }

    /// Full `tools/list` advertisement: locally-registered tools plus the
    /// GUI tools served through the bridge.
    fn tools_list(&self) -> Value {
        let mut tools: Vec<Value> = self
            .registry
            .schemas()
            .iter()
            .map(|s| s.to_descriptor())
            .collect();
        tools.extend(gui_tool_descriptors());
        tools.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or_default()
                .cmp(b["name"].as_str().unwrap_or_default())
        });
        json!({ "tools": tools })
    }
}

/// Descriptors for the bridge-proxied GUI tools.  These are advertised even
/// though their execution lives in the user-session helper.
fn gui_tool_descriptors() -> Vec<Value> {
    let tool = |name: &str, description: &str, properties: Value, required: Value| {
        json!({
            "name": name,
            "description": description,
            "inputSchema": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    };

    vec![
        tool(
            "desktop_screenshot",
            "Take a screenshot of the entire desktop",
            json!({
                "format": { "type": "string", "enum": ["png", "jpeg"] },
                "quality": { "type": "number", "description": "JPEG quality (0-100)" }
            }),
            json!([]),
        ),
        tool(
            "mouse_click",
            "Click at specific screen coordinates",
            json!({
                "x": { "type": "number", "description": "X coordinate" },
                "y": { "type": "number", "description": "Y coordinate" },
                "button": { "type": "string", "enum": ["left", "right", "middle"] },
                "clickCount": { "type": "number", "description": "1 for single, 2 for double" }
            }),
            json!(["x", "y"]),
        ),
        tool(
            "mouse_move",
            "Move the mouse to specific screen coordinates",
            json!({
                "x": { "type": "number" },
                "y": { "type": "number" }
            }),
            json!(["x", "y"]),
        ),
        tool(
            "mouse_drag",
            "Drag the mouse from one position to another",
            json!({
                "x1": { "type": "number", "description": "Start X" },
                "y1": { "type": "number", "description": "Start Y" },
                "x2": { "type": "number", "description": "End X" },
                "y2": { "type": "number", "description": "End Y" }
            }),
            json!(["x1", "y1", "x2", "y2"]),
        ),
        tool(
            "mouse_scroll",
            "Scroll the mouse wheel",
            json!({
                "deltaX": { "type": "number", "description": "Horizontal scroll amount" },
                "deltaY": { "type": "number", "description": "Vertical scroll amount" }
            }),
            json!([]),
        ),
        tool(
            "keyboard_type",
            "Type text using the keyboard",
            json!({ "text": { "type": "string", "description": "Text to type" } }),
            json!(["text"]),
        ),
        tool(
            "keyboard_press",
            "Press a specific key",
            json!({ "key": { "type": "string", "description": "Key to press (e.g. enter, tab, escape)" } }),
            json!(["key"]),
        ),
        tool(
            "keyboard_shortcut",
            "Execute a keyboard shortcut",
            json!({ "shortcut": { "type": "string", "description": "Shortcut (e.g. ctrl+c)" } }),
            json!(["shortcut"]),
        ),
        tool("window_list", "List all open windows", json!({}), json!([])),
        tool(
            "window_focus",
            "Focus a specific window",
            json!({
                "windowId": { "type": "string", "description": "Window identifier" },
                "title": { "type": "string", "description": "Window title (partial match)" }
            }),
            json!([]),
        ),
        tool(
            "app_launch",
            "Launch an application",
            json!({ "identifier": { "type": "string", "description": "App name or bundle ID" } }),
            json!(["identifier"]),
        ),
        tool(
            "app_quit",
            "Quit an application",
            json!({
                "identifier": { "type": "string", "description": "App name or bundle ID" },
                "force": { "type": "boolean", "description": "Force quit" }
            }),
            json!(["identifier"]),
        ),
    ]
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use screencontrol_security::SecurityGate;
    use screencontrol_tools::{register_all, SessionManager};

    use super::*;

    fn dispatcher() -> Dispatcher {
        let mut registry = ToolRegistry::new();
        register_all(
            &mut registry,
            Arc::new(SecurityGate::with_defaults()),
            Arc::new(SessionManager::new(Duration::from_secs(3600))),
        );
        // Port 1: the bridge is always unreachable in unit tests.
        Dispatcher::new(registry, GuiBridgeClient::new(1), "1.2.0")
    }

    fn invocation(method: &str, params: Value) -> ToolInvocation {
        ToolInvocation {
            request_id: None,
            method: method.to_string(),
            params,
        }
    }

    // ── Alias normalization ───────────────────────────────────────────────────

    #[test]
    fn historical_aliases_resolve_to_canonical_names() {
        assert_eq!(canonical("listDirectory"), "fs_list");
        assert_eq!(canonical("readFile"), "fs_read");
        assert_eq!(canonical("writeFile"), "fs_write");
        assert_eq!(canonical("deleteFile"), "fs_delete");
        assert_eq!(canonical("moveFile"), "fs_move");
        assert_eq!(canonical("executeCommand"), "shell_exec");
        assert_eq!(canonical("click"), "mouse_click");
        assert_eq!(canonical("moveMouse"), "mouse_move");
        assert_eq!(canonical("scrollMouse"), "mouse_scroll");
        assert_eq!(canonical("typeText"), "keyboard_type");
        assert_eq!(canonical("pressKey"), "keyboard_press");
        assert_eq!(canonical("unlockMachine"), "machine_unlock");
    }

    #[test]
    fn canonical_names_pass_through() {
        assert_eq!(canonical("fs_read"), "fs_read");
        assert_eq!(canonical("system_info"), "system_info");
    }

    #[tokio::test]
    async fn alias_dispatches_to_the_same_tool() {
        let d = dispatcher();
        let a = d.dispatch(invocation("system_info", json!({}))).await;
        assert_eq!(a.result["success"], true);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        std::fs::write(&path, "alias").unwrap();
        let b = d
            .dispatch(invocation("readFile", json!({"path": path.to_str().unwrap()})))
            .await;
        assert_eq!(b.result["content"], "alias");
    }

    // ── MCP meta-set ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn tools_list_advertises_local_and_gui_tools() {
        let d = dispatcher();
        let out = d.dispatch(invocation("tools/list", json!({}))).await;
        let tools = out.result["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"fs_read"));
        assert!(names.contains(&"shell_exec"));
        assert!(names.contains(&"mouse_click"));
        assert!(names.contains(&"desktop_screenshot"));
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted, "advertisement is sorted by name");
        for t in tools {
            assert!(t["inputSchema"]["type"] == "object");
        }
    }

    #[tokio::test]
    async fn prompts_and_resources_lists_are_empty() {
        let d = dispatcher();
        let p = d.dispatch(invocation("prompts/list", json!({}))).await;
        assert_eq!(p.result["prompts"], json!([]));
        let r = d.dispatch(invocation("resources/list", json!({}))).await;
        assert_eq!(r.result["resources"], json!([]));
    }

    // ── Inline methods ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn health_and_ping_answer_inline() {
        let d = dispatcher();
        for method in ["health", "ping"] {
            let out = d.dispatch(invocation(method, json!({}))).await;
            assert_eq!(out.result["status"], "ok");
        }
    }

    #[tokio::test]
    async fn machine_unlock_without_password_is_rejected() {
        let d = dispatcher();
        let out = d.dispatch(invocation("machine_unlock", json!({}))).await;
        assert_eq!(out.result["success"], false);
        assert!(d.pending_unlock().lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn machine_unlock_queues_for_credential_provider() {
        let d = dispatcher();
        let out = d
            .dispatch(invocation(
                "machine_unlock",
                json!({"username": "alice", "password": "pw"}),
            ))
            .await;
        assert_eq!(out.result["success"], true);
        let pending = d.pending_unlock().lock().unwrap().clone().unwrap();
        assert_eq!(pending["username"], "alice");
    }

    // ── GUI proxy ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn gui_method_with_dead_bridge_flags_bridge_down() {
        let d = dispatcher();
        let out = d.dispatch(invocation("screenshot", json!({}))).await;
        assert!(out.gui_bridge_down);
        assert_eq!(out.result["success"], false);
        assert!(out.result["error"]
            .as_str()
            .unwrap()
            .contains("GUI bridge not available"));
    }

    #[tokio::test]
    async fn local_methods_never_flag_bridge_down() {
        let d = dispatcher();
        let out = d.dispatch(invocation("system_info", json!({}))).await;
        assert!(!out.gui_bridge_down);
    }

    // ── Unknown methods ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_method_is_reported_not_crashed() {
        let d = dispatcher();
        let out = d.dispatch(invocation("frobnicate", json!({}))).await;
        assert_eq!(out.result["success"], false);
        assert!(out.result["error"]
            .as_str()
            .unwrap()
            .contains("Unknown method: frobnicate"));
    }
}
