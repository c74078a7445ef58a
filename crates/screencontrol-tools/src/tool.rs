// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// Trait every tool handler implements.
///
/// A tool is a pure function of its JSON parameters: it consults the
/// security gate, performs its I/O, and returns a JSON object following the
/// `{success: bool, ...}` convention.  Handlers never panic across this
/// boundary and never retain file handles or child processes between calls
/// (shell sessions are the explicit exception and live in the session
/// manager).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters, advertised via `tools/list`.
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Failures are reported via [`err`], never raised.
    async fn execute(&self, params: &Value) -> Value;
}

/// Successful result: `fields` (a JSON object) plus `success: true`.
pub fn ok(fields: Value) -> Value {
    let mut obj = fields.as_object().cloned().unwrap_or_default();
    obj.insert("success".into(), Value::Bool(true));
    Value::Object(obj)
}

/// Failure result: `{success: false, error: <msg>}`.
pub fn err(msg: impl Into<String>) -> Value {
    serde_json::json!({ "success": false, "error": msg.into() })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ok_sets_success_and_keeps_fields() {
        let v = ok(json!({"path": "/tmp/x", "size": 5}));
        assert_eq!(v["success"], true);
        assert_eq!(v["path"], "/tmp/x");
        assert_eq!(v["size"], 5);
    }

    #[test]
    fn ok_with_empty_object_is_bare_success() {
        let v = ok(json!({}));
        assert_eq!(v, json!({"success": true}));
    }

    #[test]
    fn err_carries_message() {
        let v = err("boom");
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "boom");
    }

    #[test]
    fn ok_success_wins_over_caller_field() {
        // A handler cannot accidentally emit success:false through ok().
        let v = ok(json!({"success": false}));
        assert_eq!(v["success"], true);
    }
}
