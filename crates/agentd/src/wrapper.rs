// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY Wrapper (spec §4.1): owns exactly one child process attached to a
//! pseudo-terminal, streams its output into a ring buffer, exposes an API
//! to write bytes to its input, and emits structured events when output
//! matches recognised markers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::ansi;
use crate::error::{AgentError, ErrorKind};
use crate::idle::IdleDetector;
use crate::parser::{self, Command};
use crate::pty::{Backend, BackendHandle, ExitStatus};
use crate::ring::RingBuffer;

/// Lifecycle states (spec §4.1: `STARTING → RUNNING → (RUNNING ↔ INJECTING)
/// → STOPPING → EXITED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    Starting,
    Running,
    Injecting,
    Stopping,
    Exited,
}

/// Events emitted by the wrapper as it observes child output and lifecycle
/// transitions.
#[derive(Debug, Clone)]
pub enum WrapperEvent {
    Output(Bytes),
    Summary(String),
    SessionEnd(String),
    Command(Command),
    InjectionFailed { message_id: String, attempts: u32 },
    Exit(ExitStatus),
}

/// Upper bound on bytes held across chunks while waiting for a fenced
/// marker to close. Past this, the buffer is flushed as-is so a child that
/// never closes a fence can't grow the wrapper's memory without bound.
const MAX_PENDING_TEXT: usize = 64 * 1024;

struct WrapperInner {
    state: RwLock<WrapperState>,
    last_summary_raw: Mutex<Option<String>>,
    session_end_processed: AtomicBool,
    pending_text: Mutex<String>,
}

/// True once every fenced marker opened in `text` has also been closed.
/// The Backend delivers PTY output in fixed-size chunks (spec §4.1), so a
/// multi-line marker can straddle a chunk boundary; parsing must wait for
/// the close tag rather than running on a partial body.
fn fences_balanced(text: &str) -> bool {
    let tag_balanced = |open: &str, close: &str| text.matches(open).count() <= text.matches(close).count();
    tag_balanced("[[SUMMARY]]", "[[/SUMMARY]]")
        && tag_balanced("[[SESSION_END]]", "[[/SESSION_END]]")
        && text.matches("<<<").count() <= text.matches(">>>").count()
}

/// Owns one child process on a PTY. Cheap to clone — all mutable state is
/// shared.
#[derive(Clone)]
pub struct Wrapper {
    name: String,
    backend_handle: BackendHandle,
    input_tx: mpsc::Sender<Bytes>,
    event_tx: mpsc::Sender<WrapperEvent>,
    ring: Arc<parking_lot::RwLock<RingBuffer>>,
    idle: IdleDetector,
    relay_prefix: String,
    continuity_prefix: String,
    inner: Arc<WrapperInner>,
}

impl Wrapper {
    /// Start a backend and begin streaming its output. Returns the wrapper
    /// plus the event receiver the caller should drain.
    pub fn start(
        name: impl Into<String>,
        backend: Box<dyn Backend>,
        ring_size: usize,
        idle: IdleDetector,
        relay_prefix: impl Into<String>,
        continuity_prefix: impl Into<String>,
    ) -> (Self, mpsc::Receiver<WrapperEvent>) {
        let name = name.into();
        let backend_handle = backend.handle();
        idle.set_pid(backend_handle.child_pid());

        let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(256);
        let (input_tx, input_rx) = mpsc::channel::<Bytes>(256);
        let (event_tx, event_rx) = mpsc::channel::<WrapperEvent>(256);

        let wrapper = Self {
            name: name.clone(),
            backend_handle,
            input_tx,
            event_tx: event_tx.clone(),
            ring: Arc::new(parking_lot::RwLock::new(RingBuffer::new(ring_size))),
            idle,
            relay_prefix: relay_prefix.into(),
            continuity_prefix: continuity_prefix.into(),
            inner: Arc::new(WrapperInner {
                state: RwLock::new(WrapperState::Starting),
                last_summary_raw: Mutex::new(None),
                session_end_processed: AtomicBool::new(false),
                pending_text: Mutex::new(String::new()),
            }),
        };

        {
            let wrapper = wrapper.clone();
            tokio::spawn(async move {
                let status = backend.run(output_tx, input_rx).await;
                match status {
                    Ok(exit) => {
                        wrapper.mark_exited().await;
                        let _ = wrapper.event_tx.send(WrapperEvent::Exit(exit)).await;
                    }
                    Err(e) => {
                        warn!(error = %e, agent = %wrapper.name, "backend run loop failed");
                        wrapper.mark_exited().await;
                        let _ = wrapper
                            .event_tx
                            .send(WrapperEvent::Exit(ExitStatus { code: None, signal: None }))
                            .await;
                    }
                }
            });
        }

        {
            let wrapper = wrapper.clone();
            tokio::spawn(async move {
                *wrapper.inner.state.write().await = WrapperState::Running;
                while let Some(chunk) = output_rx.recv().await {
                    wrapper.handle_output(chunk).await;
                }
                debug!(agent = %wrapper.name, "backend output channel closed");
            });
        }

        (wrapper, event_rx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &BackendHandle {
        &self.backend_handle
    }

    pub async fn state(&self) -> WrapperState {
        *self.inner.state.read().await
    }

    /// Mark the wrapper as mid-injection (called by the Injection Engine
    /// around a write) or back to running. Output received during
    /// injection is still buffered; it just does not re-trigger idle
    /// evaluation until the write finishes (spec §4.3).
    pub async fn set_injecting(&self, injecting: bool) {
        let mut state = self.inner.state.write().await;
        if *state == WrapperState::Stopping || *state == WrapperState::Exited {
            return;
        }
        *state = if injecting { WrapperState::Injecting } else { WrapperState::Running };
    }

    /// Write raw bytes to the child's PTY input. Used by the Injection
    /// Engine to deliver a rendered message plus submit sequence.
    pub async fn write(&self, bytes: Bytes) -> Result<(), AgentError> {
        self.input_tx.send(bytes).await.map_err(|_| {
            AgentError::new("wrapper", ErrorKind::PtyWriteError, "backend input channel closed")
                .with_agent_id(self.name.clone())
        })
    }

    /// Cooperative stop: SIGTERM, then SIGKILL after `grace` if still
    /// alive. Idempotent.
    pub async fn stop(&self, grace: Duration) {
        {
            let mut state = self.inner.state.write().await;
            if *state == WrapperState::Exited {
                return;
            }
            *state = WrapperState::Stopping;
        }
        let _ = self.backend_handle.send_signal(nix::libc::SIGTERM);
        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if !self.backend_handle.is_alive() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if self.backend_handle.is_alive() {
            let _ = self.backend_handle.send_signal(nix::libc::SIGKILL);
        }
    }

    pub fn kill(&self, signal: i32) -> anyhow::Result<()> {
        self.backend_handle.send_signal(signal)
    }

    /// Replay bytes from the ring buffer starting at `offset`.
    pub fn read_from(&self, offset: u64) -> Option<Vec<u8>> {
        let ring = self.ring.read();
        ring.read_from(offset).map(|(a, b)| {
            let mut v = a.to_vec();
            v.extend_from_slice(b);
            v
        })
    }

    async fn handle_output(&self, chunk: Bytes) {
        {
            let mut ring = self.ring.write();
            ring.write(&chunk);
        }
        let _ = self.event_tx.send(WrapperEvent::Output(chunk.clone())).await;

        let raw_text = String::from_utf8_lossy(&chunk).into_owned();
        let stripped = ansi::strip(&raw_text);
        self.idle.record_output(&stripped);

        let text = {
            let mut pending = self.inner.pending_text.lock();
            pending.push_str(&stripped);
            if !fences_balanced(&pending) && pending.len() < MAX_PENDING_TEXT {
                return;
            }
            std::mem::take(&mut *pending)
        };

        let joined = parser::join_continuations(&text, &[&self.relay_prefix, &self.continuity_prefix]);
        let commands = parser::find_commands(&joined, &self.relay_prefix, &self.continuity_prefix);

        for command in commands {
            match command {
                Command::Summary { body } => {
                    let is_dup = {
                        let mut last = self.inner.last_summary_raw.lock();
                        if last.as_deref() == Some(body.as_str()) {
                            true
                        } else {
                            *last = Some(body.clone());
                            false
                        }
                    };
                    if is_dup {
                        continue;
                    }
                    let _ = self.event_tx.send(WrapperEvent::Summary(body)).await;
                }
                Command::SessionEnd { body } => {
                    if self.inner.session_end_processed.swap(true, Ordering::SeqCst) {
                        continue;
                    }
                    let _ = self.event_tx.send(WrapperEvent::SessionEnd(body)).await;
                }
                other => {
                    let _ = self.event_tx.send(WrapperEvent::Command(other)).await;
                }
            }
        }
    }

    /// Report an injection-failed event on the wrapper's own stream, used
    /// by the Injection Engine when a message exhausts its retries.
    pub async fn report_injection_failed(&self, message_id: String, attempts: u32) {
        let _ = self.event_tx.send(WrapperEvent::InjectionFailed { message_id, attempts }).await;
    }

    /// Wait up to `deadline` for the wrapper to observe `EXITED`. Used by
    /// tests and the Supervisor's shutdown path.
    pub async fn wait_exited(&self, deadline: Duration) -> bool {
        timeout(deadline, async {
            loop {
                if *self.inner.state.read().await == WrapperState::Exited {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }

    pub(crate) async fn mark_exited(&self) {
        *self.inner.state.write().await = WrapperState::Exited;
    }
}

#[cfg(test)]
#[path = "wrapper_tests.rs"]
mod tests;
