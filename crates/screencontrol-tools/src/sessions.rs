// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Interactive shell session manager.
//!
//! Sessions live in a process-wide map keyed by an opaque id.  The map mutex
//! is held only for lookups and inserts; pipe I/O always happens on handles
//! cloned out of the map, so a long write or drain cannot block other
//! sessions.  Two background tasks per session continuously drain the
//! child's stdout/stderr into buffers, which `read_output` swaps out — the
//! polled-read model keeps the control-channel envelope small.
//!
//! Child-exit detection is opportunistic: a failed `send_input` is
//! authoritative and removes the session; the idle reaper cleans up anything
//! the callers forget.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use crate::tool::{err, ok};

#[derive(Clone)]
struct ShellSession {
    pid: u32,
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    child: Arc<tokio::sync::Mutex<Child>>,
    stdout_buf: Arc<Mutex<String>>,
    stderr_buf: Arc<Mutex<String>>,
    started_at: DateTime<Utc>,
    last_activity: Arc<Mutex<Instant>>,
}

impl ShellSession {
    fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }
}

/// Process-wide session map plus lifecycle orchestration.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, ShellSession>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Spawn a session child with all three stdio pipes and insert it into
    /// the map.  An empty `command` starts the platform's interactive shell.
    pub async fn start(&self, command: Option<&str>, cwd: Option<&str>) -> Value {
        let mut cmd = shell_command(command);
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd.filter(|d| !d.is_empty()) {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return err(format!("Failed to start session: {e}")),
        };
        let pid = child.id().unwrap_or_default();

        let stdin = match child.stdin.take() {
            Some(s) => s,
            None => return err("Failed to start session: stdin pipe missing"),
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(pipe) = stdout {
            spawn_drain(pipe, stdout_buf.clone());
        }
        if let Some(pipe) = stderr {
            spawn_drain(pipe, stderr_buf.clone());
        }

        let session = ShellSession {
            pid,
            stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
            child: Arc::new(tokio::sync::Mutex::new(child)),
            stdout_buf,
            stderr_buf,
            started_at: Utc::now(),
            last_activity: Arc::new(Mutex::new(Instant::now())),
        };

        let session_id = generate_session_id();
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.clone(), session);
        info!(session = %session_id, pid, "shell session started");

        ok(json!({ "session_id": session_id, "pid": pid }))
    }

    /// Write to the session's stdin.  A broken pipe means the child is gone;
    /// the entry is removed on the spot.
    pub async fn send_input(&self, session_id: &str, input: &str) -> Value {
        let Some(session) = self.get(session_id) else {
            return err("Session not found");
        };

        let result = {
            let mut stdin = session.stdin.lock().await;
            match stdin.write_all(input.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(()) => {
                session.touch();
                ok(json!({
                    "session_id": session_id,
                    "bytes_written": input.len(),
                }))
            }
            Err(e) => {
                warn!(session = %session_id, "stdin write failed, reaping: {e}");
                if let Some(dead) = self.remove(session_id) {
                    reap(dead).await;
                }
                err(format!("Failed to write to session: {e}"))
            }
        }
    }

    /// Drain the buffered stdout/stderr collected since the last read.
    pub async fn read_output(&self, session_id: &str) -> Value {
        let Some(session) = self.get(session_id) else {
            return err("Session not found");
        };

        let stdout = std::mem::take(&mut *session.stdout_buf.lock().unwrap());
        let stderr = std::mem::take(&mut *session.stderr_buf.lock().unwrap());
        let running = session
            .child
            .lock()
            .await
            .try_wait()
            .ok()
            .flatten()
            .is_none();
        session.touch();

        ok(json!({
            "session_id": session_id,
            "stdout": stdout,
            "stderr": stderr,
            "running": running,
        }))
    }

    /// Signal the child, reap it, close all handles and erase the entry.
    /// Idempotent: an unknown id reports `Session not found`.
    pub async fn stop(&self, session_id: &str, signal: &str) -> Value {
        let Some(session) = self.remove(session_id) else {
            return err("Session not found");
        };
        info!(session = %session_id, signal, "stopping shell session");
        deliver_signal(&session, signal).await;
        reap(session).await;
        ok(json!({ "session_id": session_id, "signal": signal }))
    }

    /// Snapshot of the live sessions, oldest first.
    pub fn list(&self) -> Vec<Value> {
        let sessions = self.sessions.lock().unwrap();
        let mut rows: Vec<(DateTime<Utc>, Value)> = sessions
            .iter()
            .map(|(id, s)| {
                (
                    s.started_at,
                    json!({
                        "session_id": id,
                        "pid": s.pid,
                        "started_at": s.started_at.to_rfc3339(),
                    }),
                )
            })
            .collect();
        rows.sort_by_key(|(t, _)| *t);
        rows.into_iter().map(|(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every session concurrently with the given signal (shutdown path).
    pub async fn stop_all(&self, signal: &str) {
        let drained: Vec<(String, ShellSession)> =
            self.sessions.lock().unwrap().drain().collect();
        let mut set = tokio::task::JoinSet::new();
        for (id, session) in drained {
            let signal = signal.to_string();
            set.spawn(async move {
                info!(session = %id, signal = %signal, "stopping shell session");
                deliver_signal(&session, &signal).await;
                reap(session).await;
            });
        }
        while set.join_next().await.is_some() {}
    }

    /// Background task that stops sessions idle past the configured timeout.
    /// The caller aborts the returned handle on shutdown.
    pub fn spawn_reaper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mgr = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                let idle: Vec<String> = {
                    let sessions = mgr.sessions.lock().unwrap();
                    sessions
                        .iter()
                        .filter(|(_, s)| s.idle_for() > mgr.idle_timeout)
                        .map(|(id, _)| id.clone())
                        .collect()
                };
                for id in idle {
                    info!(session = %id, "reaping idle shell session");
                    mgr.stop(&id, "TERM").await;
                }
            }
        })
    }

    fn get(&self, session_id: &str) -> Option<ShellSession> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    fn remove(&self, session_id: &str) -> Option<ShellSession> {
        self.sessions.lock().unwrap().remove(session_id)
    }
}

/// `session_` + 16 lowercase hex chars — a 24-char opaque ascii id.
fn generate_session_id() -> String {
    let bits: u64 = rand::thread_rng().gen();
    format!("session_{bits:016x}")
}

fn shell_command(command: Option<&str>) -> Command {
    #[cfg(unix)]
    {
        let program = command.filter(|c| !c.is_empty()).unwrap_or("/bin/bash");
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(program);
        cmd
    }
    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("powershell");
        cmd.args(["-NoLogo", "-NoProfile"]);
        if let Some(c) = command.filter(|c| !c.is_empty()) {
            cmd.arg("-Command").arg(c);
        }
        cmd
    }
}

/// Drain a pipe into a shared buffer until EOF.
fn spawn_drain<R>(mut reader: R, buf: Arc<Mutex<String>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf
                    .lock()
                    .unwrap()
                    .push_str(&String::from_utf8_lossy(&chunk[..n])),
            }
        }
    });
}

async fn deliver_signal(session: &ShellSession, signal: &str) {
    #[cfg(unix)]
    {
        let sig = match signal {
            "KILL" | "9" => libc::SIGKILL,
            "INT" | "2" => libc::SIGINT,
            "HUP" | "1" => libc::SIGHUP,
            _ => libc::SIGTERM,
        };
        debug!(pid = session.pid, sig, "delivering signal");
        unsafe {
            libc::kill(session.pid as i32, sig);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal;
        let _ = session.child.lock().await.start_kill();
    }
}

/// Opportunistic reap: poll briefly for exit, then let the drop close the
/// pipes.  `kill_on_drop` covers a child that ignores its signal.
async fn reap(session: ShellSession) {
    for _ in 0..5 {
        if session.child.lock().await.try_wait().ok().flatten().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
