// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{err, ok, Tool};

/// Read an environment variable of this process.
pub struct EnvGetTool;

#[async_trait]
impl Tool for EnvGetTool {
    fn name(&self) -> &str {
        "env_get"
    }

    fn description(&self) -> &str {
        "Read an environment variable."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Variable name" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return err("missing 'name'");
        };
        match std::env::var(name) {
            Ok(value) => ok(json!({ "name": name, "value": value, "exists": true })),
            Err(_) => ok(json!({ "name": name, "value": Value::Null, "exists": false })),
        }
    }
}

/// Set an environment variable of this process.
pub struct EnvSetTool;

#[async_trait]
impl Tool for EnvSetTool {
    fn name(&self) -> &str {
        "env_set"
    }

    fn description(&self) -> &str {
        "Set an environment variable for this process and its future children."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Variable name" },
                "value": { "type": "string", "description": "Variable value" }
            },
            "required": ["name", "value"]
        })
    }

    async fn execute(&self, params: &Value) -> Value {
        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return err("missing 'name'");
        };
        let Some(value) = params.get("value").and_then(|v| v.as_str()) else {
            return err("missing 'value'");
        };
        if name.is_empty() || name.contains('=') || name.contains('\0') {
            return err("invalid variable name");
        }
        std::env::set_var(name, value);
        ok(json!({ "name": name, "value": value }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
