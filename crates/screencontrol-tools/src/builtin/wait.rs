// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{err, ok, Tool};

/// Upper bound on a single wait: 60 s.
const MAX_WAIT_MS: i64 = 60_000;

/// Sleep for the requested number of milliseconds.
pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Wait for the specified number of milliseconds (0-60000)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "milliseconds": { "type": "number", "description": "Time to wait in milliseconds" }
            },
            "required": ["milliseconds"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(ms) = params.get("milliseconds").and_then(|v| v.as_i64()) else {
            return err("missing 'milliseconds'");
        };
        if ms < 0 {
            return err("Invalid wait time");
        }
        if ms > MAX_WAIT_MS {
            return err("Maximum wait time is 60 seconds");
        }

        tokio::time::sleep(std::time::Duration::from_millis(ms as u64)).await;
        ok(json!({ "waited": ms }))
    }
}

/// Current wall-clock time as epoch millis plus local ISO-8601.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current time (epoch milliseconds and local ISO-8601)."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: &Value) -> Value {
        let now = chrono::Local::now();
        ok(json!({
            "timestamp": now.timestamp_millis(),
            "iso": now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waits_and_reports() {
        let start = std::time::Instant::now();
        let out = WaitTool.execute(&json!({"milliseconds": 50})).await;
        assert_eq!(out["success"], true);
        assert_eq!(out["waited"], 50);
        assert!(start.elapsed().as_millis() >= 50);
    }

    #[tokio::test]
    async fn negative_wait_is_rejected_without_sleeping() {
        let start = std::time::Instant::now();
        let out = WaitTool.execute(&json!({"milliseconds": -1})).await;
        assert_eq!(out["success"], false);
        assert!(start.elapsed().as_millis() < 50, "must not sleep");
    }

    #[tokio::test]
    async fn oversized_wait_is_rejected_without_sleeping() {
        let start = std::time::Instant::now();
        let out = WaitTool.execute(&json!({"milliseconds": 60001})).await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("60"));
        assert!(start.elapsed().as_millis() < 50, "must not sleep");
    }

    #[tokio::test]
    async fn exactly_60000_is_accepted_by_validation() {
        // Only validation is under test; zero keeps the suite fast.
        let out = WaitTool.execute(&json!({"milliseconds": 0})).await;
        assert_eq!(out["success"], true);
    }

    #[tokio::test]
    async fn missing_milliseconds_is_error() {
        let out = WaitTool.execute(&json!({})).await;
        assert_eq!(out["success"], false);
    }

    #[tokio::test]
    async fn current_time_has_both_formats() {
        let out = CurrentTimeTool.execute(&json!({})).await;
        assert_eq!(out["success"], true);
        assert!(out["timestamp"].as_i64().unwrap() > 1_600_000_000_000);
        let iso = out["iso"].as_str().unwrap();
        assert_eq!(iso.len(), 19);
        assert!(iso.contains('T'));
    }
}
