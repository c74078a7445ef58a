// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! GUI bridge client — forwards GUI method calls to the user-session helper
//! over loopback HTTP.
//!
//! The privileged service has no display connection, so anything that
//! touches the screen, input devices or window list runs in the helper that
//! owns the interactive session.  One POST (or GET for parameter-less
//! reads) per invocation, five-second connect timeout, thirty-second read
//! timeout, no retries: GUI operations are latency-sensitive and not
//! assumed idempotent, so a single failure surfaces to the caller.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::NodeError;

/// Loopback HTTP client for the user-session GUI helper.
pub struct GuiBridgeClient {
    base: String,
    client: reqwest::Client,
}

impl GuiBridgeClient {
    pub fn new(port: u16) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            base: format!("http://127.0.0.1:{port}"),
            client,
        }
    }

    /// Forward a canonical GUI method to the helper and return its JSON
    /// response verbatim.
    pub async fn forward(&self, method: &str, params: &Value) -> Result<Value, NodeError> {
        let (get, path) = route(method);
        let url = format!("{}{}", self.base, path);
        debug!(method, %url, "forwarding to GUI bridge");

        let request = if get {
            self.client.get(&url)
        } else {
            self.client.post(&url).json(params)
        };

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::BridgeUnavailable(e.to_string()))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| NodeError::BridgeUnavailable(format!("invalid bridge response: {e}")))
    }
}

/// Map a canonical GUI method to (is_get, helper path).  The helper exposes
/// the same per-operation paths as the public REST surface; unmapped
/// methods fall back to `POST /<method>`.
fn route(method: &str) -> (bool, String) {
    let (get, path) = match method {
        "screenshot" | "desktop_screenshot" | "screenshot_app" => (true, "/screenshot"),
        "mouse_click" | "click_absolute" | "doubleClick" | "clickElement" => (false, "/click"),
        "mouse_move" => (false, "/mouse/move"),
        "mouse_scroll" => (false, "/mouse/scroll"),
        "mouse_drag" | "drag" => (false, "/mouse/drag"),
        "getMousePosition" => (true, "/mouse/position"),
        "keyboard_type" => (false, "/keyboard/type"),
        "keyboard_press" | "keyboard_shortcut" => (false, "/keyboard/key"),
        "getClickableElements" | "getUIElements" => (true, "/ui/elements"),
        "window_list" | "listApplications" => (true, "/ui/windows"),
        "getActiveWindow" => (true, "/ui/active"),
        "window_focus" | "focusApplication" => (false, "/ui/focus"),
        other => return (false, format!("/{other}")),
    };
    (get, path.to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
