// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod clipboard;
pub mod env;
pub mod fs_delete;
pub mod fs_grep;
pub mod fs_list;
pub mod fs_patch;
pub mod fs_read;
pub mod fs_search;
pub mod fs_write;
pub mod shell_exec;
pub mod shell_session;
pub mod system_info;
pub mod wait;

use std::sync::Arc;

use screencontrol_security::SecurityGate;

use crate::registry::ToolRegistry;
use crate::sessions::SessionManager;

/// Register every locally-executed tool under its canonical name.
/// Alias resolution happens in the dispatcher, not here.
pub fn register_all(
    registry: &mut ToolRegistry,
    gate: Arc<SecurityGate>,
    sessions: Arc<SessionManager>,
) {
    registry.register(fs_list::FsListTool { gate: gate.clone() });
    registry.register(fs_read::FsReadTool { gate: gate.clone() });
    registry.register(fs_read::FsReadRangeTool { gate: gate.clone() });
    registry.register(fs_write::FsWriteTool { gate: gate.clone() });
    registry.register(fs_delete::FsDeleteTool { gate: gate.clone() });
    registry.register(fs_delete::FsMoveTool { gate: gate.clone() });
    registry.register(fs_search::FsSearchTool { gate: gate.clone() });
    registry.register(fs_grep::FsGrepTool { gate: gate.clone() });
    registry.register(fs_patch::FsPatchTool { gate: gate.clone() });

    registry.register(shell_exec::ShellExecTool { gate: gate.clone() });
    registry.register(shell_session::ShellStartSessionTool {
        gate,
        sessions: sessions.clone(),
    });
    registry.register(shell_session::ShellSendInputTool {
        sessions: sessions.clone(),
    });
    registry.register(shell_session::ShellReadOutputTool {
        sessions: sessions.clone(),
    });
    registry.register(shell_session::ShellStopSessionTool {
        sessions: sessions.clone(),
    });
    registry.register(shell_session::ShellListSessionsTool { sessions });

    registry.register(system_info::SystemInfoTool);
    registry.register(clipboard::ClipboardReadTool);
    registry.register(clipboard::ClipboardWriteTool);
    registry.register(wait::WaitTool);
    registry.register(wait::CurrentTimeTool);
    registry.register(env::EnvGetTool);
    registry.register(env::EnvSetTool);
}

// ─── Registry contract tests ─────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn full_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_all(
            &mut registry,
            Arc::new(SecurityGate::with_defaults()),
            Arc::new(SessionManager::new(Duration::from_secs(3600))),
        );
        registry
    }

    #[test]
    fn every_canonical_tool_is_registered() {
        let registry = full_registry();
        for name in [
            "fs_list",
            "fs_read",
            "fs_read_range",
            "fs_write",
            "fs_delete",
            "fs_move",
            "fs_search",
            "fs_grep",
            "fs_patch",
            "shell_exec",
            "shell_start_session",
            "shell_send_input",
            "shell_read_output",
            "shell_stop_session",
            "shell_list_sessions",
            "system_info",
            "clipboard_read",
            "clipboard_write",
            "wait",
            "current_time",
            "env_get",
            "env_set",
        ] {
            assert!(registry.contains(name), "tool {name} not registered");
        }
    }

    #[test]
    fn schemas_cover_all_tools_and_are_sorted() {
        let registry = full_registry();
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), registry.names().len());
        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn every_tool_survives_empty_arguments() {
        // Contract: invalid arguments produce {success:false}, never a panic.
        let registry = full_registry();
        for name in registry.names() {
            if name == "wait" || name.starts_with("shell_start") {
                continue; // wait(0) sleeps zero but needs the arg; start spawns
            }
            let out = registry.execute(&name, &serde_json::json!({})).await;
            assert!(out.get("success").is_some(), "{name} returned no envelope");
        }
    }
}
