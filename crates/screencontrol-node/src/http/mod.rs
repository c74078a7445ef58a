// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Local REST surface.
//!
//! A static route table binds HTTP method + path to a dispatcher method;
//! every handler builds a [`ToolInvocation`] with `request_id: None` and
//! replies synchronously with `application/json` and permissive CORS.
//!
//! Status codes: 200 for every completed dispatch, even `{success:false}`
//! payloads — 4xx/5xx are reserved for transport-level failures (malformed
//! request JSON, failed bearer auth, unreachable GUI bridge → 502).
//!
//! # Bind policy
//!
//! Defaults to loopback.  When the configured host widens the bind, every
//! non-`/`, non-`/health` request must carry `Authorization: Bearer <apiKey>`;
//! loopback binds skip the check.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use screencontrol_config::Config;
use screencontrol_tools::SessionManager;

use crate::control::ConnState;
use crate::dispatch::{Dispatcher, ToolInvocation};
use crate::error::NodeError;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<RwLock<Config>>,
    pub config_path: Arc<PathBuf>,
    pub sessions: Arc<SessionManager>,
    pub conn_state: watch::Receiver<ConnState>,
    pub pending_unlock: Arc<Mutex<Option<Value>>>,
    pub started_at: Instant,
}

/// Bind the listener and serve until the token cancels.
pub async fn serve(
    state: AppState,
    addr: std::net::SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), NodeError> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// The full route table.  GUI paths dispatch to bridge-proxied methods, the
/// rest to local handlers.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/settings", get(settings_get).post(settings_post))
        .route("/tools/list", invoke_get("tools/list"))
        // ── GUI (proxied to the user-session helper) ─────────────────────────
        .route("/screenshot", invoke_get("screenshot"))
        .route("/click", invoke_post("mouse_click"))
        .route("/mouse/move", invoke_post("mouse_move"))
        .route("/mouse/scroll", invoke_post("mouse_scroll"))
        .route("/mouse/drag", invoke_post("mouse_drag"))
        .route("/mouse/position", invoke_get("getMousePosition"))
        .route("/keyboard/type", invoke_post("keyboard_type"))
        .route("/keyboard/key", invoke_post("keyboard_press"))
        .route("/ui/elements", invoke_get("getUIElements"))
        .route("/ui/windows", invoke_get("window_list"))
        .route("/ui/active", invoke_get("getActiveWindow"))
        .route("/ui/focus", invoke_post("window_focus"))
        // ── Filesystem ───────────────────────────────────────────────────────
        .route("/fs/list", invoke_post("fs_list"))
        .route("/fs/read", invoke_post("fs_read"))
        .route("/fs/read_range", invoke_post("fs_read_range"))
        .route("/fs/write", invoke_post("fs_write"))
        .route("/fs/delete", invoke_post("fs_delete"))
        .route("/fs/move", invoke_post("fs_move"))
        .route("/fs/search", invoke_post("fs_search"))
        .route("/fs/grep", invoke_post("fs_grep"))
        .route("/fs/patch", invoke_post("fs_patch"))
        // ── Shell ────────────────────────────────────────────────────────────
        .route("/shell/exec", invoke_post("shell_exec"))
        .route("/shell/session/start", invoke_post("shell_start_session"))
        .route("/shell/session/input", invoke_post("shell_send_input"))
        .route("/shell/session/output", invoke_post("shell_read_output"))
        .route("/shell/session/stop", invoke_post("shell_stop_session"))
        .route("/shell/sessions", invoke_get("shell_list_sessions"))
        // ── System ───────────────────────────────────────────────────────────
        .route("/system/info", invoke_get("system_info"))
        .route("/clipboard/read", invoke_get("clipboard_read"))
        .route("/clipboard/write", invoke_post("clipboard_write"))
        .route("/wait", invoke_post("wait"))
        // ── Machine control ──────────────────────────────────────────────────
        .route("/machine/lock", invoke_post("machine_lock"))
        .route("/machine/unlock", invoke_post("machine_unlock"))
        .route("/machine/info", invoke_get("machine_info"))
        // ── Credential-provider hooks (pending-unlock polling) ───────────────
        .route("/credential-provider/unlock", get(cp_unlock))
        .route("/credential-provider/credentials", get(cp_credentials))
        .route("/credential-provider/result", post(cp_result))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        // CORS outermost so preflight short-circuits before auth.
        .layer(cors)
        .with_state(state)
}

// ── Dispatch plumbing ─────────────────────────────────────────────────────────

fn invoke_get(method: &'static str) -> MethodRouter<AppState> {
    get(move |State(state): State<AppState>| run_invocation(state, method, json!({})))
}

fn invoke_post(method: &'static str) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, Json(params): Json<Value>| {
        run_invocation(state, method, params)
    })
}

async fn run_invocation(state: AppState, method: &'static str, params: Value) -> Response {
    let dispatch = state
        .dispatcher
        .dispatch(ToolInvocation {
            request_id: None,
            method: method.to_string(),
            params,
        })
        .await;
    let status = if dispatch.gui_bridge_down {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    (status, Json(dispatch.result)).into_response()
}

// ── Plain handlers ────────────────────────────────────────────────────────────

async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "screencontrol",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": true }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config.read().await;
    Json(json!({
        "success": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "connection": state.conn_state.borrow().label(),
        "controlServerConfigured": !config.control_server_url.is_empty(),
        "activeSessions": state.sessions.len(),
    }))
}

async fn settings_get(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config.read().await;
    Json(redacted(&config))
}

async fn settings_post(
    State(state): State<AppState>,
    Json(patch): Json<Value>,
) -> impl IntoResponse {
    let mut config = state.config.write().await;
    let mut updated = config.clone();
    if let Err(e) = updated.merge(&patch) {
        return Json(json!({ "success": false, "error": e.to_string() }));
    }
    if let Err(e) = screencontrol_config::save(&updated, &state.config_path) {
        return Json(json!({ "success": false, "error": e.to_string() }));
    }
    *config = updated;
    Json(json!({ "success": true, "config": redacted(&config) }))
}

/// Settings view with the API key replaced by a presence flag.
fn redacted(config: &Config) -> Value {
    let mut v = serde_json::to_value(config).unwrap_or_default();
    if let Some(obj) = v.as_object_mut() {
        let has_key = obj.remove("apiKey").map_or(false, |k| !k.is_null());
        obj.insert("hasApiKey".into(), Value::Bool(has_key));
        obj.insert("success".into(), Value::Bool(true));
    }
    v
}

// ── Credential-provider hooks ─────────────────────────────────────────────────
//
// The Windows credential provider polls these endpoints for pending unlock
// commands.  The pending slot is memory-only; its privileged semantics live
// out of process.

async fn cp_unlock(State(state): State<AppState>) -> impl IntoResponse {
    let pending = state.pending_unlock.lock().unwrap().is_some();
    Json(json!({ "success": true, "pending": pending }))
}

async fn cp_credentials(State(state): State<AppState>) -> impl IntoResponse {
    match state.pending_unlock.lock().unwrap().clone() {
        Some(credentials) => {
            let mut v = credentials;
            if let Some(obj) = v.as_object_mut() {
                obj.insert("success".into(), Value::Bool(true));
            }
            Json(v)
        }
        None => Json(json!({ "success": false, "error": "No pending unlock" })),
    }
}

async fn cp_result(State(state): State<AppState>, Json(body): Json<Value>) -> impl IntoResponse {
    state.pending_unlock.lock().unwrap().take();
    let completed = body.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
    Json(json!({ "success": true, "completed": completed }))
}

// ── Bearer auth (non-loopback binds only) ─────────────────────────────────────

async fn require_bearer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path();
    if path == "/" || path == "/health" {
        return next.run(req).await;
    }

    let (loopback, api_key) = {
        let config = state.config.read().await;
        (config.binds_loopback(), config.api_key.clone())
    };
    if loopback {
        return next.run(req).await;
    }

    let Some(expected) = api_key.filter(|k| !k.is_empty()) else {
        return unauthorized("API key not configured for non-loopback bind");
    };
    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == expected => next.run(req).await,
        _ => unauthorized("Unauthorized"),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
