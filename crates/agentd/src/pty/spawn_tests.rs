// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bytes::Bytes;
use tokio::sync::mpsc;

use super::*;

#[tokio::test]
async fn spawns_and_captures_output() -> anyhow::Result<()> {
    let command = vec!["/bin/echo".to_string(), "hello-pty".to_string()];
    let pty = NativePty::spawn(&command, None, &[], 80, 24)?;
    let handle = pty.handle();
    assert!(handle.child_pid().is_some());

    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(16);
    let (_in_tx, in_rx) = mpsc::channel::<Bytes>(1);

    let status = Box::new(pty).run(out_tx, in_rx).await?;
    assert_eq!(status.code, Some(0));

    let mut collected = Vec::new();
    while let Ok(chunk) = out_rx.try_recv() {
        collected.extend_from_slice(&chunk);
    }
    let text = String::from_utf8_lossy(&collected);
    assert!(text.contains("hello-pty"), "unexpected output: {text:?}");
    Ok(())
}

#[tokio::test]
async fn missing_executable_fails_fast() {
    let command = vec!["/definitely/not/a/real/binary".to_string()];
    // forkpty itself succeeds (exec happens in the child); the child exits
    // 127 and `run()` observes that, rather than `spawn()` failing.
    let pty = NativePty::spawn(&command, None, &[], 80, 24).expect("forkpty succeeds");
    let (out_tx, _out_rx) = mpsc::channel::<Bytes>(16);
    let (_in_tx, in_rx) = mpsc::channel::<Bytes>(1);
    let status = Box::new(pty).run(out_tx, in_rx).await.expect("run completes");
    assert_eq!(status.code, Some(127));
}

#[test]
fn empty_command_is_rejected() {
    let err = NativePty::spawn(&[], None, &[], 80, 24).unwrap_err();
    assert!(err.to_string().contains("at least one argument"));
}

#[test]
fn handle_reports_alive_child() -> anyhow::Result<()> {
    let command = vec!["/bin/sleep".to_string(), "5".to_string()];
    let pty = NativePty::spawn(&command, None, &[], 80, 24)?;
    let handle = pty.handle();
    assert!(handle.is_alive());
    handle.send_signal(nix::libc::SIGKILL)?;
    Ok(())
}
