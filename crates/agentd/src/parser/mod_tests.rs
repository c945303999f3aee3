// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const RELAY: &str = "->relay:";
const CONTINUITY: &str = "->continuity:";

#[test]
fn parses_single_line_relay() {
    let cmds = find_commands("->relay:bob hello\n", RELAY, CONTINUITY);
    assert_eq!(cmds, vec![Command::Relay { to: "bob".into(), body: "hello".into() }]);
}

#[test]
fn parses_fenced_relay() {
    let text = "->relay:bob <<<\nline one\nline two\n>>>\n";
    let cmds = find_commands(text, RELAY, CONTINUITY);
    assert_eq!(
        cmds,
        vec![Command::Relay { to: "bob".into(), body: "line one\nline two".into() }]
    );
}

#[test]
fn parses_broadcast_and_channel_targets() {
    let cmds = find_commands("->relay:* hi all\n->relay:#eng ship it\n", RELAY, CONTINUITY);
    assert_eq!(
        cmds,
        vec![
            Command::Relay { to: "*".into(), body: "hi all".into() },
            Command::Relay { to: "#eng".into(), body: "ship it".into() },
        ]
    );
}

#[test]
fn parses_spawn_single_line() {
    let text = r#"->relay:spawn carol claude "fix the flaky test""#;
    let cmds = find_commands(text, RELAY, CONTINUITY);
    assert_eq!(
        cmds,
        vec![Command::Spawn {
            name: "carol".into(),
            cli: "claude".into(),
            task: "fix the flaky test".into()
        }]
    );
}

#[test]
fn parses_spawn_fenced() {
    let text = "->relay:spawn carol claude <<<\nfix the flaky test\n>>>\n";
    let cmds = find_commands(text, RELAY, CONTINUITY);
    assert_eq!(
        cmds,
        vec![Command::Spawn {
            name: "carol".into(),
            cli: "claude".into(),
            task: "fix the flaky test".into()
        }]
    );
}

#[test]
fn spawn_is_not_also_parsed_as_generic_relay() {
    let text = r#"->relay:spawn carol claude "fix the flaky test""#;
    let cmds = find_commands(text, RELAY, CONTINUITY);
    assert_eq!(cmds.len(), 1);
}

#[test]
fn parses_release() {
    let cmds = find_commands("->relay:release carol\n", RELAY, CONTINUITY);
    assert_eq!(cmds, vec![Command::Release { name: "carol".into() }]);
}

#[test]
fn parses_channel_join() {
    let cmds = find_commands("->relay:join #eng\n", RELAY, CONTINUITY);
    assert_eq!(cmds, vec![Command::ChannelJoin { channel: "#eng".into() }]);
}

#[test]
fn parses_channel_leave() {
    let cmds = find_commands("->relay:leave #eng\n", RELAY, CONTINUITY);
    assert_eq!(cmds, vec![Command::ChannelLeave { channel: "#eng".into() }]);
}

#[test]
fn parses_continuity_save_fenced() {
    let text = "->continuity:save <<<\nCurrent task: refactor\n>>>\n";
    let cmds = find_commands(text, RELAY, CONTINUITY);
    assert_eq!(
        cmds,
        vec![Command::ContinuitySave { handoff: false, body: "Current task: refactor".into() }]
    );
}

#[test]
fn parses_continuity_save_handoff_flag() {
    let text = "->continuity:save --handoff <<<\nCurrent task: refactor\n>>>\n";
    let cmds = find_commands(text, RELAY, CONTINUITY);
    assert_eq!(
        cmds,
        vec![Command::ContinuitySave { handoff: true, body: "Current task: refactor".into() }]
    );
}

#[test]
fn parses_continuity_load() {
    let cmds = find_commands("->continuity:load\n", RELAY, CONTINUITY);
    assert_eq!(cmds, vec![Command::ContinuityLoad]);
}

#[test]
fn parses_continuity_search_quoted() {
    let cmds = find_commands(r#"->continuity:search "auth flow""#, RELAY, CONTINUITY);
    assert_eq!(cmds, vec![Command::ContinuitySearch { query: "auth flow".into() }]);
}

#[test]
fn parses_continuity_uncertain() {
    let cmds = find_commands(r#"->continuity:uncertain "is caching on?""#, RELAY, CONTINUITY);
    assert_eq!(cmds, vec![Command::ContinuityUncertain { item: "is caching on?".into() }]);
}

#[test]
fn parses_summary_block() {
    let text = "[[SUMMARY]]\nCurrent task: refactor\nCompleted: login\n[[/SUMMARY]]\n";
    let cmds = find_commands(text, RELAY, CONTINUITY);
    assert_eq!(
        cmds,
        vec![Command::Summary { body: "Current task: refactor\nCompleted: login".into() }]
    );
}

#[test]
fn parses_session_end_block() {
    let text = "[[SESSION_END]]\nwrapping up\n[[/SESSION_END]]\n";
    let cmds = find_commands(text, RELAY, CONTINUITY);
    assert_eq!(cmds, vec![Command::SessionEnd { body: "wrapping up".into() }]);
}

#[test]
fn commands_are_returned_in_document_order() {
    let text = "->relay:bob first\n->relay:carol second\n";
    let cmds = find_commands(text, RELAY, CONTINUITY);
    assert_eq!(
        cmds,
        vec![
            Command::Relay { to: "bob".into(), body: "first".into() },
            Command::Relay { to: "carol".into(), body: "second".into() },
        ]
    );
}

#[test]
fn continuation_joining_absorbs_indented_lines() {
    let text = "->relay:bob hello\n  world\nplain line\n";
    let joined = join_continuations(text, &[RELAY, CONTINUITY]);
    assert_eq!(joined, "->relay:bob hello\nworld\nplain line");
}

#[test]
fn continuation_joining_stops_at_bullet_or_new_prefix() {
    let text = "->relay:bob hello\n  - a bullet\n->relay:carol next\n";
    let joined = join_continuations(text, &[RELAY, CONTINUITY]);
    assert_eq!(joined, "->relay:bob hello\n  - a bullet\n->relay:carol next");
}
