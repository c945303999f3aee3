// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod nbio;
pub mod spawn;

use std::future::Future;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use nix::libc;
use nix::pty::Winsize;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use spawn::NativePty;

/// Exit status of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// True when a signal killed the process (as opposed to a normal exit).
    pub fn was_signaled(&self) -> bool {
        self.signal.is_some()
    }

    /// True for a clean, code-0 exit.
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}

/// A cheap, cloneable control surface over a running backend: signalling,
/// resizing, liveness, and PID, kept separate from the output-consuming
/// `Backend::run` future so the wrapper can hold one while the other runs
/// on its own task.
#[derive(Clone)]
pub struct BackendHandle {
    child_pid: Option<u32>,
    raw_fd: Option<RawFd>,
    cols: Arc<AtomicU16>,
    rows: Arc<AtomicU16>,
}

impl BackendHandle {
    pub fn new(child_pid: Option<u32>, raw_fd: Option<RawFd>, cols: u16, rows: u16) -> Self {
        Self {
            child_pid,
            raw_fd,
            cols: Arc::new(AtomicU16::new(cols)),
            rows: Arc::new(AtomicU16::new(rows)),
        }
    }

    pub fn child_pid(&self) -> Option<u32> {
        self.child_pid
    }

    /// Send a POSIX signal (by number) to the child process (spec §6:
    /// SIGINT for interrupt, SIGTERM for cooperative stop, SIGKILL after
    /// grace).
    pub fn send_signal(&self, sig: i32) -> anyhow::Result<()> {
        let Some(pid) = self.child_pid else {
            anyhow::bail!("backend has no child process");
        };
        let signal = Signal::try_from(sig)?;
        signal::kill(Pid::from_raw(pid as i32), signal)?;
        Ok(())
    }

    /// Best-effort liveness probe (`kill(pid, 0)` semantics).
    pub fn is_alive(&self) -> bool {
        self.child_pid
            .map(|pid| signal::kill(Pid::from_raw(pid as i32), None).is_ok())
            .unwrap_or(false)
    }

    // TIOCSWINSZ ioctl requires unsafe for the libc::ioctl call.
    #[allow(unsafe_code)]
    pub fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.cols.store(cols, Ordering::Relaxed);
        self.rows.store(rows, Ordering::Relaxed);
        let Some(fd) = self.raw_fd else {
            return Ok(());
        };
        let ws = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };
        // SAFETY: TIOCSWINSZ is a well-defined ioctl that sets the window
        // size on the PTY master fd, which outlives this handle.
        let ret = unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            anyhow::bail!("TIOCSWINSZ ioctl failed: {}", std::io::Error::last_os_error());
        }
        Ok(())
    }
}

/// PTY backend abstraction, object-safe for use as `Box<dyn Backend>` so
/// tests can substitute a fake backend for the real `forkpty`-based one.
pub trait Backend: Send + 'static {
    fn handle(&self) -> BackendHandle;

    fn run(
        self: Box<Self>,
        output_tx: mpsc::Sender<Bytes>,
        input_rx: mpsc::Receiver<Bytes>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExitStatus>> + Send>>;
}
