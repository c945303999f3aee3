// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::*;
use crate::collaborators::{
    NullCloudPersistenceSink, PermissiveWorkspacePolicy, UnboundedScalingPolicy,
    WorkspacePolicySource,
};
use crate::continuity::store::LedgerStore;
use crate::continuity::ContinuityManager;
use crate::error::ErrorKind;
use crate::events::ManagerEvent;
use crate::registry::Registry;
use crate::relay::Switchboard;

async fn test_manager() -> (tempfile::TempDir, AgentManager) {
    test_manager_with_policy(Arc::new(PermissiveWorkspacePolicy)).await
}

async fn test_manager_with_policy(
    policy: Arc<dyn WorkspacePolicySource>,
) -> (tempfile::TempDir, AgentManager) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.data_dir = Some(dir.path().to_path_buf());
    config.ring_size = 8192;
    config.idle_min_silence_ms = 50;
    let config = Arc::new(config);

    let registry = Arc::new(Registry::load(dir.path()).expect("registry load"));
    let switchboard = Arc::new(Switchboard::new(config.dedupe_capacity));
    let store = LedgerStore::open(dir.path().join("ledgers")).expect("ledger store");
    let continuity = Arc::new(ContinuityManager::new(store));

    let manager = AgentManager::new(
        config,
        registry,
        switchboard,
        continuity,
        Arc::new(NullCloudPersistenceSink),
        policy,
        Arc::new(UnboundedScalingPolicy),
    );
    (dir, manager)
}

async fn test_manager_with_config(
    mutate: impl FnOnce(&mut Config),
) -> (tempfile::TempDir, AgentManager) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.data_dir = Some(dir.path().to_path_buf());
    config.ring_size = 8192;
    config.idle_min_silence_ms = 50;
    mutate(&mut config);
    let config = Arc::new(config);

    let registry = Arc::new(Registry::load(dir.path()).expect("registry load"));
    let switchboard = Arc::new(Switchboard::new(config.dedupe_capacity));
    let store = LedgerStore::open(dir.path().join("ledgers")).expect("ledger store");
    let continuity = Arc::new(ContinuityManager::new(store));

    let manager = AgentManager::new(
        config,
        registry,
        switchboard,
        continuity,
        Arc::new(NullCloudPersistenceSink),
        Arc::new(PermissiveWorkspacePolicy),
        Arc::new(UnboundedScalingPolicy),
    );
    (dir, manager)
}

fn write_crash_script(dir: &std::path::Path) -> std::path::PathBuf {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("crash.sh");
    fs::write(&path, "#!/bin/sh\nexit 1\n").expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

fn spawn_request(name: &str) -> SpawnRequest {
    SpawnRequest {
        name: name.to_string(),
        provider: "/bin/cat".to_string(),
        task: String::new(),
        resume_agent_id: None,
    }
}

#[tokio::test]
async fn spawn_lists_and_stops_agent() {
    let (_dir, manager) = test_manager().await;
    let info =
        manager.spawn("ws1", std::env::temp_dir(), spawn_request("cat1")).await.expect("spawn");
    assert_eq!(info.name, "cat1");
    assert_eq!(info.status, AgentStatus::Running);
    assert!(manager.list().iter().any(|a| a.name == "cat1"));

    manager.stop("cat1").await.expect("stop");
    assert!(manager.list().iter().all(|a| a.name != "cat1"));
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let (_dir, manager) = test_manager().await;
    let cwd = std::env::temp_dir();
    manager.spawn("ws1", cwd.clone(), spawn_request("dup")).await.expect("first spawn");

    let err = manager.spawn("ws1", cwd, spawn_request("dup")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SpawnError);

    manager.stop("dup").await.ok();
}

struct DenyAll;

impl WorkspacePolicySource for DenyAll {
    fn may_spawn(&self, _workspace_id: &str, _provider: &str) -> bool {
        false
    }
}

#[tokio::test]
async fn workspace_policy_denial_blocks_spawn() {
    let (_dir, manager) = test_manager_with_policy(Arc::new(DenyAll)).await;
    let err = manager
        .spawn("ws1", std::env::temp_dir(), spawn_request("denied"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SpawnError);
    assert!(manager.list().is_empty());
}

#[tokio::test]
async fn stop_unknown_agent_errors() {
    let (_dir, manager) = test_manager().await;
    assert!(manager.stop("ghost").await.is_err());
}

#[tokio::test]
async fn send_input_reaches_child_pty() {
    let (_dir, manager) = test_manager().await;
    let info = manager
        .spawn("ws1", std::env::temp_dir(), spawn_request("echoer"))
        .await
        .expect("spawn");

    manager.send_input(&info.name, Bytes::from_static(b"ping\n")).await.expect("write");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let output = manager.get_output(&info.name, 0, None).unwrap_or_default();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("ping"), "unexpected output: {text:?}");

    manager.stop(&info.name).await.ok();
}

#[tokio::test]
async fn stop_all_in_workspace_clears_only_that_workspace() {
    let (_dir, manager) = test_manager().await;
    manager.spawn("ws1", std::env::temp_dir(), spawn_request("a1")).await.expect("spawn a1");
    manager.spawn("ws2", std::env::temp_dir(), spawn_request("b1")).await.expect("spawn b1");

    manager.stop_all_in_workspace("ws1").await;

    let names: Vec<String> = manager.list().into_iter().map(|a| a.name).collect();
    assert!(!names.contains(&"a1".to_string()));
    assert!(names.contains(&"b1".to_string()));

    manager.stop_all_in_workspace("ws2").await;
}

/// Carries restart history across restarts: the second crash within the
/// backoff window must be declared permanently dead, not reset to a fresh
/// one-attempt-per-call restart policy.
#[tokio::test]
async fn restart_history_persists_until_permanently_dead() {
    let (_dir, manager) = test_manager_with_config(|c| {
        c.max_restarts = 1;
        c.backoff_window_secs = 60;
    })
    .await;
    let scripts = tempfile::tempdir().expect("scripts dir");
    let script = write_crash_script(scripts.path());

    let mut events = manager.events();
    manager
        .spawn(
            "ws1",
            scripts.path().to_path_buf(),
            SpawnRequest {
                name: "flaky".to_string(),
                provider: script.to_str().unwrap().to_string(),
                task: String::new(),
                resume_agent_id: None,
            },
        )
        .await
        .expect("spawn flaky");

    let mut restarted_attempt = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline && restarted_attempt.is_none() {
        if let Ok(Ok(ManagerEvent::Restarted { name, attempt })) =
            tokio::time::timeout(Duration::from_millis(200), events.recv()).await
        {
            if name == "flaky" {
                restarted_attempt = Some(attempt);
            }
        }
    }
    assert_eq!(restarted_attempt, Some(1), "first restart should be attempt 1");

    let mut stopped = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline && !stopped {
        if let Ok(Ok(ManagerEvent::Stopped { name })) =
            tokio::time::timeout(Duration::from_millis(200), events.recv()).await
        {
            if name == "flaky" {
                stopped = true;
            }
        }
    }
    assert!(stopped, "agent should be permanently stopped after exceeding max_restarts");
    assert!(
        manager.list().into_iter().all(|a| a.name != "flaky"),
        "permanently dead agent should be removed from the live set"
    );
}
