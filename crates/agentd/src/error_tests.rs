// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn crash_detected_is_informational() {
    assert!(ErrorKind::CrashDetected.is_informational());
    assert!(!ErrorKind::SpawnError.is_informational());
}

#[test]
fn wire_strings_are_stable() {
    assert_eq!(ErrorKind::LockTimeout.as_str(), "LOCK_TIMEOUT");
    assert_eq!(ErrorKind::AuthRevocation.as_str(), "AUTH_REVOCATION");
}

#[test]
fn agent_error_carries_required_fields() {
    let err = AgentError::new("relay", ErrorKind::RelayOverflow, "queue full")
        .with_agent_id("alice")
        .with_context(serde_json::json!({"dropped": 1}));

    assert_eq!(err.component, "relay");
    assert_eq!(err.agent_id.as_deref(), Some("alice"));
    assert_eq!(err.kind, ErrorKind::RelayOverflow);
    assert_eq!(err.context["dropped"], 1);
    assert!(err.timestamp_ms > 0);
    assert!(err.to_string().contains("RELAY_OVERFLOW"));
}
