// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn create_then_load_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LedgerStore::open(dir.path()).expect("open");
    store.create("alice", "claude", "sess-1", "agent-1").await.expect("create");

    let loaded = store.load("alice").expect("loaded");
    assert_eq!(loaded.agent_id, "agent-1");
    assert_eq!(loaded.cli, "claude");
}

#[test]
fn sanitize_rejects_path_separators() {
    assert!(sanitize("../evil").is_err());
    assert!(sanitize("a/b").is_err());
    assert!(sanitize("").is_err());
    assert!(sanitize("alice").is_ok());
}

#[tokio::test]
async fn update_merges_and_preserves_identity() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LedgerStore::open(dir.path()).expect("open");
    store.create("alice", "claude", "sess-1", "agent-1").await.expect("create");

    let updated = store
        .update("alice", |ledger| ledger.current_task = Some("build thing".to_string()))
        .await
        .expect("update ok")
        .expect("ledger present");
    assert_eq!(updated.current_task.as_deref(), Some("build thing"));
    assert_eq!(updated.agent_id, "agent-1");
}

#[tokio::test]
async fn update_on_missing_agent_returns_none() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LedgerStore::open(dir.path()).expect("open");
    let result = store.update("ghost", |_| {}).await.expect("no error");
    assert!(result.is_none());
}

#[tokio::test]
async fn find_by_agent_id_uses_index_then_falls_back_to_scan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LedgerStore::open(dir.path()).expect("open");
    store.create("alice", "claude", "sess-1", "agent-1").await.expect("create");

    let found = store.find_by_agent_id("agent-1").expect("found via index");
    assert_eq!(found.agent_name, "alice");

    // Corrupt the index to force a scan-and-repair path.
    let fresh_store = LedgerStore::open(dir.path()).expect("reopen");
    fresh_store.index.lock().insert("agent-1".to_string(), "wrong-name".to_string());
    let found_again = fresh_store.find_by_agent_id("agent-1").expect("found via scan");
    assert_eq!(found_again.agent_name, "alice");
}

#[tokio::test]
async fn search_is_case_insensitive_and_ranked_by_recency() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LedgerStore::open(dir.path()).expect("open");
    store.create("alice", "claude", "sess-1", "agent-1").await.expect("create");
    store.create("bob", "codex", "sess-2", "agent-2").await.expect("create");
    store
        .update("alice", |l| l.current_task = Some("Deploy PARSER module".to_string()))
        .await
        .expect("update ok");

    let results = store.search("parser", 5);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].agent_name, "alice");
}

#[tokio::test]
async fn rebuild_index_recovers_from_scratch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LedgerStore::open(dir.path()).expect("open");
    store.create("alice", "claude", "sess-1", "agent-1").await.expect("create");
    store.rebuild_index().expect("rebuild");

    let found = store.find_by_agent_id("agent-1").expect("found");
    assert_eq!(found.agent_name, "alice");
}
