// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn d() -> Denylist {
    Denylist::default()
}

#[test]
fn section_and_bullets() {
    let body = "## Completed\n- login flow\n- signup flow\n\n## Blocked\n- waiting on design review\n";
    let update = parse_save_block(body, &d());
    assert_eq!(update.completed, vec!["login flow", "signup flow"]);
    assert_eq!(update.blocked, vec!["waiting on design review"]);
}

#[test]
fn bold_key_value_trailing_colon() {
    let update = parse_save_block("**Current Task:** refactor auth\n", &d());
    assert_eq!(update.current_task.as_deref(), Some("refactor auth"));
}

#[test]
fn bold_key_value_leading_colon() {
    let update = parse_save_block("**Current Task**: refactor auth\n", &d());
    assert_eq!(update.current_task.as_deref(), Some("refactor auth"));
}

#[test]
fn plain_key_value() {
    let update = parse_save_block("Current task: ship release\n", &d());
    assert_eq!(update.current_task.as_deref(), Some("ship release"));
}

#[test]
fn plain_key_value_rejects_path_like_fields() {
    let update = parse_save_block("src/main.rs: some note\n", &d());
    assert!(update.current_task.is_none());
    assert!(update.is_empty());
}

#[test]
fn bullet_glyphs_are_stripped() {
    let body = "## Completed\n- ✓ login flow\n## Uncertain\n- ❓ is this cached?\n";
    let update = parse_save_block(body, &d());
    assert_eq!(update.completed, vec!["login flow"]);
    assert_eq!(update.uncertain_items, vec!["is this cached?"]);
}

#[test]
fn next_steps_alias_routes_to_in_progress() {
    let update = parse_save_block("## Next Steps\n- write tests\n", &d());
    assert_eq!(update.in_progress, vec!["write tests"]);
}

#[test]
fn file_context_with_line_range() {
    let update = parse_save_block("## Files\n- src/auth/login.rs:10-42\n- src/main.rs\n", &d());
    assert_eq!(
        update.file_context,
        vec![
            FileContextEntry {
                path: "src/auth/login.rs".into(),
                start_line: Some(10),
                end_line: Some(42)
            },
            FileContextEntry { path: "src/main.rs".into(), start_line: None, end_line: None },
        ]
    );
}

#[test]
fn placeholder_only_body_yields_empty_update() {
    let body = "## Completed\n- task1\n- ...\n- item1\n";
    let update = parse_save_block(body, &d());
    assert!(update.is_empty());
}

#[test]
fn unknown_section_header_resets_section_to_none() {
    let body = "## Random Notes\n- this should be ignored\n## Completed\n- real item\n";
    let update = parse_save_block(body, &d());
    assert_eq!(update.completed, vec!["real item"]);
}

#[test]
fn comma_separated_list_items_are_filtered_independently() {
    let body = "Completed: task1, ..., [...]\n";
    let update = parse_save_block(body, &d());
    assert!(update.completed.is_empty());
}

#[test]
fn comma_separated_list_keeps_real_items_beside_placeholders() {
    let body = "Completed: login, task1, onboarding\n";
    let update = parse_save_block(body, &d());
    assert_eq!(update.completed, vec!["login", "onboarding"]);
}

#[test]
fn key_decisions_alias() {
    let update = parse_save_block("## Decided\n- use postgres over sqlite\n", &d());
    assert_eq!(update.key_decisions, vec!["use postgres over sqlite"]);
}
