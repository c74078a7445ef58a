// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::{Config, DebugConfig};

/// Platform-conventional location of the persisted configuration.
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support"))
            .join("ScreenControl/config.json")
    }
    #[cfg(target_os = "windows")]
    {
        let base = std::env::var_os("PROGRAMDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"));
        base.join(r"ScreenControl\config.json")
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        PathBuf::from("/etc/screencontrol/config.json")
    }
}

/// Load the configuration.
///
/// `extra` overrides the platform default (the `--config` CLI flag).  A
/// missing file is not an error — the defaults apply and the first settings
/// write creates it.  A `debug-config.json` next to the config file, when
/// present, overlays the control-server URL and registration identifiers.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let path = extra.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    let mut config = if path.is_file() {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "configuration loaded");
        config
    } else {
        info!(path = %path.display(), "no config file found, using defaults");
        Config::default()
    };

    // Developer overlay.  Parse failures are logged and ignored — a broken
    // debug file must not take the installed agent down.
    let debug_path = path.with_file_name("debug-config.json");
    if debug_path.is_file() {
        match std::fs::read_to_string(&debug_path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str::<DebugConfig>(&text).map_err(Into::into))
        {
            Ok(overlay) => {
                debug!(path = %debug_path.display(), "applying debug-config overlay");
                if !overlay.server_url.is_empty() {
                    config.control_server_url = overlay.server_url;
                }
                if !overlay.endpoint_uuid.is_empty() {
                    config.license_uuid = overlay.endpoint_uuid;
                }
                if !overlay.customer_id.is_empty() {
                    config.customer_id = overlay.customer_id;
                }
            }
            Err(e) => warn!(path = %debug_path.display(), "ignoring debug-config: {e}"),
        }
    }

    Ok(config)
}

/// Persist the configuration, creating the parent directory if needed.
pub fn save(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let text = serde_json::to_string_pretty(config)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "configuration saved");
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut cfg = Config::default();
        cfg.http_port = 4000;
        cfg.agent_name = "bench".into();
        save(&cfg, &path).unwrap();

        let back = load(Some(&path)).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/config.json");
        save(&Config::default(), &path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load(Some(&path)).is_err());
    }

    #[test]
    fn debug_config_overlays_control_server_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save(&Config::default(), &path).unwrap();
        std::fs::write(
            dir.path().join("debug-config.json"),
            r#"{"serverUrl":"wss://dev.example.com/ws","endpointUuid":"lic-1","customerId":"cust-9"}"#,
        )
        .unwrap();

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.control_server_url, "wss://dev.example.com/ws");
        assert_eq!(cfg.license_uuid, "lic-1");
        assert_eq!(cfg.customer_id, "cust-9");
    }

    #[test]
    fn broken_debug_config_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save(&Config::default(), &path).unwrap();
        std::fs::write(dir.path().join("debug-config.json"), "{{{{").unwrap();

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg, Config::default());
    }
}
