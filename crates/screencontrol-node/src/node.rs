// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Agent startup — assembles all subsystems and runs them.
//!
//! # Startup sequence
//!
//! [`run`] performs these steps in order:
//!
//! 1. Build the security gate (embedded defaults + `security.json` next to
//!    the config file).
//! 2. Create the shell session manager and spawn its idle reaper.
//! 3. Register the full local toolset and construct the dispatcher with the
//!    GUI bridge client.
//! 4. Start the control-server client when a URL is configured (reconnect
//!    supervisor + heartbeat live inside it).
//! 5. Start the Axum HTTP server (blocks until shutdown).
//!
//! # Shutdown
//!
//! SIGTERM / SIGINT cancels the shared token: the HTTP server drains, the
//! control client closes its socket and stops its tasks, and every shell
//! session is stopped in parallel with SIGTERM before `run` returns.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use screencontrol_config::{machine_id, Config};
use screencontrol_security::SecurityGate;
use screencontrol_tools::builtin::system_info;
use screencontrol_tools::{register_all, SessionManager, ToolRegistry};

use crate::bridge::GuiBridgeClient;
use crate::control::{ConnState, ControlClient, ControlConfig};
use crate::dispatch::Dispatcher;
use crate::error::NodeError;
use crate::http::{self, AppState};

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the agent until shutdown.  Returns after a clean drain; startup
/// failures (unparseable bind address, port in use) surface as errors.
pub async fn run(config: Config, config_path: PathBuf) -> Result<(), NodeError> {
    let addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port)
        .parse()
        .map_err(|e| NodeError::Config(format!("invalid bind address: {e}")))?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    // ── Security gate ─────────────────────────────────────────────────────────
    let security_json = config_path.with_file_name("security.json");
    let gate = Arc::new(SecurityGate::load(Some(&security_json)));

    // ── Shell sessions ────────────────────────────────────────────────────────
    let sessions = Arc::new(SessionManager::new(Duration::from_secs(
        config.session_idle_timeout_secs.max(60),
    )));
    let reaper = sessions.clone().spawn_reaper();

    // ── Dispatcher ────────────────────────────────────────────────────────────
    let mut registry = ToolRegistry::new();
    register_all(&mut registry, gate, sessions.clone());
    let bridge = GuiBridgeClient::new(config.gui_bridge_port);
    let dispatcher = Arc::new(Dispatcher::new(registry, bridge, AGENT_VERSION));

    // ── Control-server channel ────────────────────────────────────────────────
    let conn_state = if config.control_server_url.is_empty() {
        info!("control server not configured, running local-only");
        let (_tx, rx) = watch::channel(ConnState::Disconnected);
        rx
    } else {
        let mut control = ControlConfig::new(config.control_server_url.clone());
        control.machine_id = machine_id().to_string();
        control.machine_name = if config.agent_name.is_empty() {
            system_info::hostname()
        } else {
            config.agent_name.clone()
        };
        control.agent_version = AGENT_VERSION.to_string();
        control.license_uuid = config.license_uuid.clone();
        control.customer_id = config.customer_id.clone();

        let (client, state_rx) =
            ControlClient::new(control, dispatcher.clone(), shutdown.clone());
        tokio::spawn(client.run());
        state_rx
    };

    // ── HTTP server (blocks until shutdown) ───────────────────────────────────
    if !config.binds_loopback() && config.api_key.is_none() {
        warn!("non-loopback bind without apiKey: only / and /health will answer");
    }

    let state = AppState {
        pending_unlock: dispatcher.pending_unlock(),
        dispatcher,
        config: Arc::new(RwLock::new(config)),
        config_path: Arc::new(config_path),
        sessions: sessions.clone(),
        conn_state,
        started_at: Instant::now(),
    };

    let result = http::serve(state, addr, shutdown.clone()).await;

    // ── Drain ─────────────────────────────────────────────────────────────────
    shutdown.cancel();
    reaper.abort();
    sessions.stop_all("TERM").await;
    info!("agent stopped");
    result
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => return,
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(_) => return,
            };
            tokio::select! {
                _ = sigterm.recv() => info!("SIGTERM received"),
                _ = sigint.recv()  => info!("SIGINT received"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl-c received");
        }
        shutdown.cancel();
    });
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
