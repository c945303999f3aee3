// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn classifies_broadcast() {
    assert_eq!(classify("*"), RecipientKind::Broadcast);
}

#[test]
fn classifies_channel() {
    assert_eq!(classify("#general"), RecipientKind::Channel("general".to_string()));
}

#[test]
fn classifies_dm_and_canonicalizes() {
    let kind = classify("dm:bob:alice");
    assert_eq!(kind, RecipientKind::Dm(vec!["bob".to_string(), "alice".to_string()]));
    let RecipientKind::Dm(participants) = kind else { panic!("expected dm") };
    assert_eq!(canonical_dm(&participants), "dm:alice:bob");
}

#[test]
fn classifies_private() {
    assert_eq!(classify("private:ops"), RecipientKind::Private("ops".to_string()));
}

#[test]
fn classifies_plain_agent_name() {
    assert_eq!(classify("worker-1"), RecipientKind::Agent("worker-1".to_string()));
}

#[test]
fn membership_excludes_sender_and_evicts_when_empty() {
    let mut registry = ChannelRegistry::new();
    registry.join("#general", "a");
    registry.join("#general", "b");
    assert_eq!(registry.members_excluding("#general", "a"), vec!["b".to_string()]);

    registry.leave("#general", "a");
    registry.leave("#general", "b");
    assert!(registry.members_excluding("#general", "").is_empty());
}

#[test]
fn leave_all_removes_member_from_every_channel() {
    let mut registry = ChannelRegistry::new();
    registry.join("#a", "x");
    registry.join("#b", "x");
    registry.join("#b", "y");
    registry.leave_all("x");
    assert!(registry.members_excluding("#a", "").is_empty());
    assert_eq!(registry.members_excluding("#b", ""), vec!["y".to_string()]);
}
