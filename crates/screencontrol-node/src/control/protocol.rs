// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Wire protocol between the agent and the control server.
//!
//! All frames are RFC 6455 text frames carrying UTF-8 JSON, discriminated by
//! a `type` field.  Field names are camelCase on the wire.
//!
//! # Typical session flow
//!
//! ```text
//! Agent                                Control server
//!   │                                       │
//!   │── register {machineId, ...} ─────────►│
//!   │◄─ registered {agentId, config} ───────│  heartbeat task starts
//!   │                                       │
//!   │── heartbeat {timestamp, ...} ────────►│  every heartbeatInterval ms
//!   │◄─ heartbeat_ack {licenseStatus} ──────│  refreshes license state
//!   │                                       │
//!   │◄─ request {id, method, params} ───────│
//!   │── response {id, result} ─────────────►│  exactly one per request id
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Agent → server messages ───────────────────────────────────────────────────

/// Hardware fingerprint sent with registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub hostname: String,
    pub cpu_model: String,
    pub mac_addresses: Vec<String>,
}

/// Messages the agent sends to the control server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// First frame after the WebSocket opens.  Registration must precede any
    /// request handling.
    #[serde(rename_all = "camelCase")]
    Register {
        machine_id: String,
        machine_name: String,
        /// `linux`, `macos` or `windows`.
        os_type: String,
        os_version: String,
        arch: String,
        agent_version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        license_uuid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        customer_id: Option<String>,
        fingerprint: Fingerprint,
    },

    /// Periodic liveness frame with power and lock-state piggybacks.
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        timestamp: i64,
        power_state: String,
        is_screen_locked: bool,
    },

    /// Reply to a `request` frame; `id` echoes the request id.
    Response { id: String, result: Value },
}

// ── Server → agent messages ───────────────────────────────────────────────────

/// Server-pushed configuration inside `registered`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub heartbeat_interval: Option<u64>,
}

/// Messages the control server sends to the agent.  Unknown `type` values
/// and malformed frames are logged and dropped, never fatal.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Registered {
        agent_id: String,
        license_status: String,
        #[serde(default)]
        config: Option<ServerConfig>,
    },

    #[serde(rename_all = "camelCase")]
    HeartbeatAck {
        #[serde(default)]
        license_status: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    Request {
        id: String,
        method: String,
        #[serde(default)]
        params: Value,
    },

    /// Response to a command this agent relayed to another agent.  Relay is
    /// not implemented; the frame is accepted and ignored.
    #[serde(rename_all = "camelCase")]
    RelayResponse {
        #[serde(default)]
        id: Option<String>,
    },
}

pub fn encode(msg: &AgentMessage) -> String {
    // AgentMessage contains only JSON-representable data; encoding cannot fail.
    serde_json::to_string(msg).unwrap_or_default()
}

pub fn decode(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn register_uses_camel_case_keys_and_snake_case_type() {
        let msg = AgentMessage::Register {
            machine_id: "m-1".into(),
            machine_name: "host".into(),
            os_type: "linux".into(),
            os_version: "6.1".into(),
            arch: "x86_64".into(),
            agent_version: "1.2.0".into(),
            license_uuid: Some("lic".into()),
            customer_id: None,
            fingerprint: Fingerprint {
                hostname: "host".into(),
                cpu_model: "cpu".into(),
                mac_addresses: vec!["aa:bb".into()],
            },
        };
        let v: Value = serde_json::from_str(&encode(&msg)).unwrap();
        assert_eq!(v["type"], "register");
        assert_eq!(v["machineId"], "m-1");
        assert_eq!(v["osType"], "linux");
        assert_eq!(v["licenseUuid"], "lic");
        assert!(v.get("customerId").is_none(), "empty identity fields are omitted");
        assert_eq!(v["fingerprint"]["cpuModel"], "cpu");
        assert_eq!(v["fingerprint"]["macAddresses"][0], "aa:bb");
    }

    #[test]
    fn heartbeat_carries_power_and_lock_state() {
        let msg = AgentMessage::Heartbeat {
            timestamp: 1_700_000_000_000,
            power_state: "ACTIVE".into(),
            is_screen_locked: false,
        };
        let v: Value = serde_json::from_str(&encode(&msg)).unwrap();
        assert_eq!(v["type"], "heartbeat");
        assert_eq!(v["powerState"], "ACTIVE");
        assert_eq!(v["isScreenLocked"], false);
    }

    #[test]
    fn response_echoes_request_id() {
        let msg = AgentMessage::Response {
            id: "r-1".into(),
            result: json!({"success": true}),
        };
        let v: Value = serde_json::from_str(&encode(&msg)).unwrap();
        assert_eq!(v["type"], "response");
        assert_eq!(v["id"], "r-1");
        assert_eq!(v["result"]["success"], true);
    }

    #[test]
    fn registered_parses_with_and_without_config() {
        let with = decode(
            r#"{"type":"registered","agentId":"a-1","licenseStatus":"active",
                "config":{"heartbeatInterval":2500}}"#,
        )
        .unwrap();
        match with {
            ServerMessage::Registered {
                agent_id,
                license_status,
                config,
            } => {
                assert_eq!(agent_id, "a-1");
                assert_eq!(license_status, "active");
                assert_eq!(config.unwrap().heartbeat_interval, Some(2500));
            }
            other => panic!("wrong variant: {other:?}"),
        }

        let without =
            decode(r#"{"type":"registered","agentId":"a-2","licenseStatus":"trial"}"#).unwrap();
        assert!(matches!(without, ServerMessage::Registered { config: None, .. }));
    }

    #[test]
    fn request_defaults_missing_params_to_null() {
        let msg = decode(r#"{"type":"request","id":"r-9","method":"system_info"}"#).unwrap();
        match msg {
            ServerMessage::Request { id, method, params } => {
                assert_eq!(id, "r-9");
                assert_eq!(method, "system_info");
                assert!(params.is_null());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn heartbeat_ack_tolerates_missing_license() {
        let msg = decode(r#"{"type":"heartbeat_ack"}"#).unwrap();
        assert!(matches!(msg, ServerMessage::HeartbeatAck { license_status: None }));
    }

    #[test]
    fn relay_response_is_accepted() {
        let msg = decode(r#"{"type":"relay_response","id":"x","result":{}}"#).unwrap();
        assert!(matches!(msg, ServerMessage::RelayResponse { .. }));
    }

    #[test]
    fn unknown_type_is_a_parse_error() {
        assert!(decode(r#"{"type":"totally_new_thing"}"#).is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(decode("{nope").is_err());
    }
}
