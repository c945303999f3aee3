// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn add_to_list_is_idempotent() {
    let mut ledger = Ledger::new("alice", "claude", "sess-1", "agent-1");
    ledger.add_to_list(ListField::Completed, "wrote parser");
    ledger.add_to_list(ListField::Completed, "wrote parser");
    assert_eq!(ledger.completed, vec!["wrote parser".to_string()]);
}

#[test]
fn add_decision_appends_with_timestamp() {
    let mut ledger = Ledger::new("alice", "claude", "sess-1", "agent-1");
    ledger.add_decision("use sha256 for filenames");
    assert_eq!(ledger.key_decisions.len(), 1);
    assert_eq!(ledger.key_decisions[0].text, "use sha256 for filenames");
}

#[test]
fn merge_update_preserves_identity_fields() {
    let mut ledger = Ledger::new("alice", "claude", "sess-1", "agent-1");
    let update = crate::parser::LedgerUpdate {
        current_task: Some("ship v2".to_string()),
        ..Default::default()
    };
    ledger.merge_update(update);
    assert_eq!(ledger.agent_id, "agent-1");
    assert_eq!(ledger.agent_name, "alice");
    assert_eq!(ledger.current_task.as_deref(), Some("ship v2"));
}

#[test]
fn render_compact_includes_recent_completed_tail() {
    let mut ledger = Ledger::new("alice", "claude", "sess-1", "agent-1");
    for item in ["a", "b", "c", "d"] {
        ledger.add_to_list(ListField::Completed, item);
    }
    let rendered = ledger.render_compact();
    assert!(rendered.contains("b, c, d") || rendered.contains("d, c, b"));
    assert!(!rendered.contains("a,"));
}

#[test]
fn updated_at_never_decreases() {
    let mut ledger = Ledger::new("alice", "claude", "sess-1", "agent-1");
    let before = ledger.updated_at_ms;
    ledger.add_decision("noted");
    assert!(ledger.updated_at_ms >= before);
}
