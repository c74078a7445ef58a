// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Outbound control-server connection.
//!
//! One long-lived TLS WebSocket (`wss://…/ws`, platform trust store, SNI
//! from the URL host; RFC 6455 client-side masking handled by the codec).
//! The connection's lifetime, its reader loop, its heartbeat task and the
//! write mutex form one unit owned by [`ControlClient`]; all of them
//! terminate before the supervisor redials, so a second concurrent socket
//! for the same agent can never exist.
//!
//! ```text
//! run() ── supervisor, sole Disconnected → Dialing writer
//!   │
//!   ├── run_connection()
//!   │     ├─ register frame (always first)
//!   │     ├─ reader loop — parses server frames, never writes
//!   │     ├─ heartbeat task — spawned on `registered`
//!   │     └─ worker task per request → one response frame per id
//!   │
//!   └── backoff sleep: 10 s doubling to 60 s, ±10 % jitter, then redial
//! ```
//!
//! All socket writes go through one mutex so each frame's masking and
//! length prefix stay atomic.  Malformed application-level JSON is logged
//! and dropped; only transport failures tear the connection down.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use screencontrol_tools::builtin::system_info;

use crate::control::protocol::{self, AgentMessage, Fingerprint, ServerMessage};
use crate::dispatch::{Dispatcher, ToolInvocation};

const DEFAULT_HEARTBEAT_MS: u64 = 5000;
/// Consecutive heartbeats without an ack before a forced reconnect.
const MISSED_ACK_LIMIT: u32 = 3;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Connection state published to the rest of the process.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnState {
    Disconnected,
    Dialing,
    Handshaking,
    Open {
        agent_id: String,
        license_status: String,
        heartbeat_interval_ms: u64,
    },
    Closing,
}

impl ConnState {
    /// Short label for status snapshots.
    pub fn label(&self) -> &'static str {
        match self {
            ConnState::Disconnected => "disconnected",
            ConnState::Dialing => "dialing",
            ConnState::Handshaking => "handshaking",
            ConnState::Open { .. } => "open",
            ConnState::Closing => "closing",
        }
    }
}

/// Static identity sent at registration plus reconnect tuning.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub url: String,
    pub machine_id: String,
    pub machine_name: String,
    pub agent_version: String,
    pub license_uuid: String,
    pub customer_id: String,
    pub backoff_start: Duration,
    pub backoff_cap: Duration,
}

impl ControlConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            machine_id: String::new(),
            machine_name: String::new(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            license_uuid: String::new(),
            customer_id: String::new(),
            backoff_start: Duration::from_secs(10),
            backoff_cap: Duration::from_secs(60),
        }
    }
}

pub struct ControlClient {
    config: ControlConfig,
    dispatcher: Arc<Dispatcher>,
    state_tx: watch::Sender<ConnState>,
    shutdown: CancellationToken,
}

impl ControlClient {
    pub fn new(
        config: ControlConfig,
        dispatcher: Arc<Dispatcher>,
        shutdown: CancellationToken,
    ) -> (Arc<Self>, watch::Receiver<ConnState>) {
        let (state_tx, state_rx) = watch::channel(ConnState::Disconnected);
        (
            Arc::new(Self {
                config,
                dispatcher,
                state_tx,
                shutdown,
            }),
            state_rx,
        )
    }

    pub fn state(&self) -> watch::Receiver<ConnState> {
        self.state_tx.subscribe()
    }

    /// Reconnect supervisor.  Runs until shutdown; the sole writer of the
    /// `Disconnected → Dialing` transition.
    pub async fn run(self: Arc<Self>) {
        if self.config.url.is_empty() {
            info!("control server not configured, channel disabled");
            return;
        }
        if !self.config.url.starts_with("ws://") && !self.config.url.starts_with("wss://") {
            warn!(url = %self.config.url, "control server URL must be ws:// or wss://");
            return;
        }

        let mut backoff = self.config.backoff_start;
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.set_state(ConnState::Dialing);
            info!(url = %self.config.url, "dialing control server");

            let result = self.run_connection().await;
            self.set_state(ConnState::Disconnected);
            if self.shutdown.is_cancelled() {
                break;
            }

            match result {
                Ok(true) => {
                    backoff = self.config.backoff_start;
                    warn!("control session ended, reconnecting");
                }
                Ok(false) => warn!("control session ended before registration"),
                Err(e) => warn!("control connection failed: {e}"),
            }

            let delay = jittered(backoff);
            debug!(ms = delay.as_millis() as u64, "reconnect backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => break,
            }
            backoff = (backoff * 2).min(self.config.backoff_cap);
        }
        self.set_state(ConnState::Disconnected);
    }

    /// One connection lifetime.  Returns whether `Open` was reached, so the
    /// supervisor can reset its backoff.
    async fn run_connection(&self) -> anyhow::Result<bool> {
        let (ws, _response) = connect_async(&self.config.url).await?;
        self.set_state(ConnState::Handshaking);

        let (sink, mut stream) = ws.split();
        let sink = Arc::new(Mutex::new(sink));

        // Registration must precede everything else on this socket.
        send(&sink, &self.register_message()).await?;
        debug!("register frame sent");

        let conn = self.shutdown.child_token();
        let missed_acks = Arc::new(AtomicU32::new(0));
        let mut heartbeat: Option<tokio::task::JoinHandle<()>> = None;
        let mut reached_open = false;

        let outcome = loop {
            tokio::select! {
                // Shutdown or heartbeat-forced reconnect.
                _ = conn.cancelled() => {
                    self.set_state(ConnState::Closing);
                    let _ = sink.lock().await.send(Message::Close(None)).await;
                    break Ok(reached_open);
                }
                frame = stream.next() => match frame {
                    None => break Err(anyhow::anyhow!("connection closed by server")),
                    Some(Err(e)) => break Err(e.into()),
                    Some(Ok(Message::Text(text))) => {
                        self.handle_frame(
                            &text,
                            &sink,
                            &conn,
                            &missed_acks,
                            &mut heartbeat,
                            &mut reached_open,
                        )
                        .await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.lock().await.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        break Err(anyhow::anyhow!("close frame received"));
                    }
                    Some(Ok(_)) => {} // binary and pong frames ignored
                }
            }
        };

        if let Some(task) = heartbeat {
            task.abort();
        }
        outcome
    }

    async fn handle_frame(
        &self,
        text: &str,
        sink: &Arc<Mutex<WsSink>>,
        conn: &CancellationToken,
        missed_acks: &Arc<AtomicU32>,
        heartbeat: &mut Option<tokio::task::JoinHandle<()>>,
        reached_open: &mut bool,
    ) {
        let msg = match protocol::decode(text) {
            Ok(msg) => msg,
            Err(e) => {
                // Malformed application JSON never closes the socket.
                warn!("dropping malformed control frame: {e}");
                return;
            }
        };

        match msg {
            ServerMessage::Registered {
                agent_id,
                license_status,
                config,
            } => {
                let interval = config
                    .and_then(|c| c.heartbeat_interval)
                    .unwrap_or(DEFAULT_HEARTBEAT_MS);
                info!(agent = %agent_id, license = %license_status, interval, "registered");
                self.set_state(ConnState::Open {
                    agent_id,
                    license_status,
                    heartbeat_interval_ms: interval,
                });
                *reached_open = true;
                missed_acks.store(0, Ordering::Relaxed);
                if let Some(old) = heartbeat.take() {
                    old.abort();
                }
                *heartbeat = Some(spawn_heartbeat(
                    sink.clone(),
                    conn.clone(),
                    missed_acks.clone(),
                    interval,
                ));
            }

            ServerMessage::HeartbeatAck { license_status } => {
                missed_acks.store(0, Ordering::Relaxed);
                if let Some(license) = license_status {
                    self.state_tx.send_modify(|state| {
                        if let ConnState::Open { license_status, .. } = state {
                            *license_status = license;
                        }
                    });
                }
            }

            ServerMessage::Request { id, method, params } => {
                debug!(%id, %method, "request received");
                let dispatcher = self.dispatcher.clone();
                let sink = sink.clone();
                let params = if params.is_null() {
                    serde_json::json!({})
                } else {
                    params
                };
                // Worker task per request: a slow tool cannot starve the
                // reader or the heartbeat.  Exactly one response per id.
                tokio::spawn(async move {
                    let dispatch = dispatcher
                        .dispatch(ToolInvocation {
                            request_id: Some(id.clone()),
                            method,
                            params,
                        })
                        .await;
                    let reply = AgentMessage::Response {
                        id,
                        result: dispatch.result,
                    };
                    if let Err(e) = send(&sink, &reply).await {
                        warn!("failed to send response: {e}");
                    }
                });
            }

            ServerMessage::RelayResponse { id } => {
                debug!(?id, "relay_response ignored (relay not implemented)");
            }
        }
    }

    fn register_message(&self) -> AgentMessage {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        AgentMessage::Register {
            machine_id: self.config.machine_id.clone(),
            machine_name: self.config.machine_name.clone(),
            os_type: system_info::os_type().to_string(),
            os_version: system_info::os_version(),
            arch: std::env::consts::ARCH.to_string(),
            agent_version: self.config.agent_version.clone(),
            license_uuid: non_empty(&self.config.license_uuid),
            customer_id: non_empty(&self.config.customer_id),
            fingerprint: Fingerprint {
                hostname: system_info::hostname(),
                cpu_model: system_info::cpu_model(),
                mac_addresses: system_info::mac_addresses(),
            },
        }
    }

    fn set_state(&self, state: ConnState) {
        let _ = self.state_tx.send(state);
    }
}

fn spawn_heartbeat(
    sink: Arc<Mutex<WsSink>>,
    conn: CancellationToken,
    missed_acks: Arc<AtomicU32>,
    interval_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(250)));
        ticker.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = conn.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let msg = AgentMessage::Heartbeat {
                timestamp: chrono::Utc::now().timestamp_millis(),
                power_state: "ACTIVE".to_string(),
                is_screen_locked: system_info::is_screen_locked().await,
            };
            if send(&sink, &msg).await.is_err() {
                conn.cancel();
                break;
            }

            let missed = missed_acks.fetch_add(1, Ordering::Relaxed) + 1;
            if missed >= MISSED_ACK_LIMIT {
                warn!(missed, "heartbeat_ack overdue, forcing reconnect");
                conn.cancel();
                break;
            }
        }
    })
}

/// Single write path: one frame per lock hold, so masking and the length
/// prefix stay atomic per frame.
async fn send(sink: &Arc<Mutex<WsSink>>, msg: &AgentMessage) -> anyhow::Result<()> {
    let text = protocol::encode(msg);
    sink.lock()
        .await
        .send(Message::Text(text))
        .await
        .map_err(Into::into)
}

/// ±10 % uniform jitter so a fleet of agents does not reconnect in lockstep.
fn jittered(base: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.9..=1.1);
    base.mul_f64(factor)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
