// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::mpsc;

use super::*;
use crate::pty::BackendHandle;

/// A backend that writes scripted output chunks then exits.
struct ScriptedBackend {
    chunks: Vec<Bytes>,
    exit: ExitStatus,
}

impl Backend for ScriptedBackend {
    fn handle(&self) -> BackendHandle {
        BackendHandle::new(Some(4242), None, 80, 24)
    }

    fn run(
        self: Box<Self>,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<Bytes>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ExitStatus>> + Send>>
    {
        Box::pin(async move {
            for chunk in self.chunks {
                let _ = output_tx.send(chunk).await;
            }
            // Drain input until the sender drops (wrapper holds it, so just
            // take one if available without blocking forever in tests).
            let _ = input_rx.try_recv();
            Ok(self.exit)
        })
    }
}

fn idle_detector() -> IdleDetector {
    IdleDetector::new(Duration::from_millis(50), 0.7)
}

#[tokio::test]
async fn dedupes_repeated_summary_blocks() {
    let body = "[[SUMMARY]]\ncurrent task: build parser\n[[/SUMMARY]]";
    let backend = Box::new(ScriptedBackend {
        chunks: vec![Bytes::from(body), Bytes::from(body)],
        exit: ExitStatus { code: Some(0), signal: None },
    });
    let (wrapper, mut events) =
        Wrapper::start("agent-a", backend, 4096, idle_detector(), "->relay:", "->continuity:");

    let mut summaries = 0;
    let mut exited = false;
    while let Some(event) = events.recv().await {
        match event {
            WrapperEvent::Summary(_) => summaries += 1,
            WrapperEvent::Exit(_) => {
                exited = true;
                break;
            }
            _ => {}
        }
    }
    assert!(exited);
    assert_eq!(summaries, 1);
    assert_eq!(wrapper.state().await, WrapperState::Exited);
}

#[tokio::test]
async fn summary_block_split_across_chunks_is_still_parsed() {
    let body = "[[SUMMARY]]\ncurrent task: build parser\n[[/SUMMARY]]";
    let split = body.find("build").expect("marker body contains a split point");
    let backend = Box::new(ScriptedBackend {
        chunks: vec![Bytes::from(&body[..split]), Bytes::from(&body[split..])],
        exit: ExitStatus { code: Some(0), signal: None },
    });
    let (_wrapper, mut events) =
        Wrapper::start("agent-a", backend, 4096, idle_detector(), "->relay:", "->continuity:");

    let mut summaries = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            WrapperEvent::Summary(body) => summaries.push(body),
            WrapperEvent::Exit(_) => break,
            _ => {}
        }
    }
    assert_eq!(summaries, vec!["current task: build parser".to_string()]);
}

#[tokio::test]
async fn session_end_fires_once() {
    let body = "[[SESSION_END]]\nwrapping up\n[[/SESSION_END]]";
    let backend = Box::new(ScriptedBackend {
        chunks: vec![Bytes::from(body), Bytes::from(body)],
        exit: ExitStatus { code: Some(0), signal: None },
    });
    let (_wrapper, mut events) =
        Wrapper::start("agent-b", backend, 4096, idle_detector(), "->relay:", "->continuity:");

    let mut session_ends = 0;
    while let Some(event) = events.recv().await {
        match event {
            WrapperEvent::SessionEnd(_) => session_ends += 1,
            WrapperEvent::Exit(_) => break,
            _ => {}
        }
    }
    assert_eq!(session_ends, 1);
}

#[tokio::test]
async fn relay_command_surfaces_as_command_event() {
    let body = "->relay:agent-c hello there\n";
    let backend = Box::new(ScriptedBackend {
        chunks: vec![Bytes::from(body)],
        exit: ExitStatus { code: Some(0), signal: None },
    });
    let (_wrapper, mut events) =
        Wrapper::start("agent-a", backend, 4096, idle_detector(), "->relay:", "->continuity:");

    let mut found = false;
    while let Some(event) = events.recv().await {
        if let WrapperEvent::Command(Command::Relay { to, body }) = event {
            assert_eq!(to, "agent-c");
            assert_eq!(body, "hello there");
            found = true;
        }
        if matches!(event, WrapperEvent::Exit(_)) {
            break;
        }
    }
    assert!(found);
}

#[tokio::test]
async fn write_after_exit_channel_still_accepts_until_dropped() {
    let backend = Box::new(ScriptedBackend {
        chunks: vec![],
        exit: ExitStatus { code: Some(0), signal: None },
    });
    let (wrapper, mut events) =
        Wrapper::start("agent-d", backend, 4096, idle_detector(), "->relay:", "->continuity:");
    while let Some(event) = events.recv().await {
        if matches!(event, WrapperEvent::Exit(_)) {
            break;
        }
    }
    assert!(wrapper.wait_exited(Duration::from_millis(500)).await);
}

#[tokio::test]
async fn ring_buffer_replays_written_output() {
    let backend = Box::new(ScriptedBackend {
        chunks: vec![Bytes::from("abcdef")],
        exit: ExitStatus { code: Some(0), signal: None },
    });
    let (wrapper, mut events) =
        Wrapper::start("agent-e", backend, 4096, idle_detector(), "->relay:", "->continuity:");
    while let Some(event) = events.recv().await {
        if matches!(event, WrapperEvent::Exit(_)) {
            break;
        }
    }
    assert_eq!(wrapper.read_from(0), Some(b"abcdef".to_vec()));
}
