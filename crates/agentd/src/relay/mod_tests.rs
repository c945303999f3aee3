// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_envelope_has_unique_id_and_normal_importance() {
    let a = Envelope::new("alice", "bob", "hi");
    let b = Envelope::new("alice", "bob", "hi");
    assert_ne!(a.id, b.id);
    assert_eq!(a.importance, Importance::Normal);
    assert!(a.channel.is_none());
}

#[test]
fn monotonic_ts_increases_across_envelopes() {
    let a = Envelope::new("alice", "bob", "hi");
    let b = Envelope::new("alice", "bob", "there");
    assert!(b.ts > a.ts);
}

#[test]
fn channel_envelope_carries_denormalized_channel() {
    let e = Envelope::new("alice", "#ops", "deploy");
    assert_eq!(e.channel.as_deref(), Some("#ops"));
}

#[test]
fn dm_envelope_channel_is_sorted_canonical_form() {
    let e = Envelope::new("bob", "dm:bob:alice", "hi");
    assert_eq!(e.channel.as_deref(), Some("dm:alice:bob"));
}

#[test]
fn sender_hash_truncates_to_100_bytes_on_char_boundary() {
    let long_body = "a".repeat(150);
    let e = Envelope::new("alice", "bob", long_body);
    let hash = e.sender_hash();
    assert!(hash.len() <= "bob:".len() + 100);
}

#[test]
fn builders_set_expected_fields() {
    let e = Envelope::new("alice", "bob", "hi")
        .with_kind(Kind::Command)
        .with_thread("t1")
        .with_importance(Importance::Urgent)
        .with_data(serde_json::json!({"x": 1}));
    assert_eq!(e.kind, Kind::Command);
    assert_eq!(e.thread.as_deref(), Some("t1"));
    assert!(e.is_urgent());
    assert_eq!(e.data["x"], 1);
}
