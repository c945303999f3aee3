// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::Denylist;

#[test]
fn rejects_known_literals() {
    let d = Denylist::default();
    assert!(d.is_placeholder("..."));
    assert!(d.is_placeholder("Task1"));
    assert!(d.is_placeholder("src/file1.ts"));
    assert!(d.is_placeholder("  What You've Done  "));
}

#[test]
fn rejects_regex_variants() {
    let d = Denylist::default();
    assert!(d.is_placeholder("...."));
    assert!(d.is_placeholder("[...]"));
    assert!(d.is_placeholder("<placeholder>"));
}

#[test]
fn rejects_empty() {
    let d = Denylist::default();
    assert!(d.is_placeholder(""));
    assert!(d.is_placeholder("   "));
}

#[test]
fn accepts_real_content() {
    let d = Denylist::default();
    assert!(!d.is_placeholder("refactor the login flow"));
    assert!(!d.is_placeholder("src/auth/login.rs"));
}

#[test]
fn extensible_without_code_changes() {
    let d = Denylist::with_extra(["redacted".to_string()]);
    assert!(d.is_placeholder("REDACTED"));
}
