// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured-marker parser (spec §4.5). All regexes live here so that
//! continuation-line joining (spec §4.1) and command extraction share the
//! same vocabulary, per spec.md §9's design note.

pub mod denylist;
pub mod save_block;

pub use denylist::Denylist;
pub use save_block::{parse_save_block, FileContextEntry, LedgerUpdate};

use regex::Regex;
use std::sync::LazyLock;

/// A structured command extracted from an agent's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Relay { to: String, body: String },
    Spawn { name: String, cli: String, task: String },
    Release { name: String },
    ChannelJoin { channel: String },
    ChannelLeave { channel: String },
    ContinuitySave { handoff: bool, body: String },
    ContinuityLoad,
    ContinuitySearch { query: String },
    ContinuityUncertain { item: String },
    ContinuityHandoff { body: String },
    Summary { body: String },
    SessionEnd { body: String },
}

static SUMMARY_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[\[SUMMARY\]\]\r?\n?(.*?)\r?\n?\[\[/SUMMARY\]\]").expect("valid regex")
});
static SESSION_END_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[\[SESSION_END\]\]\r?\n?(.*?)\r?\n?\[\[/SESSION_END\]\]")
        .expect("valid regex")
});

/// Apply continuation-line joining (spec §4.1): a line beginning with a
/// configured prefix absorbs subsequent indented, non-bulleted,
/// non-prefixed lines, joined by `\n`.
pub fn join_continuations(text: &str, prefixes: &[&str]) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let starts_marker = prefixes.iter().any(|p| line.trim_start().starts_with(p));
        if !starts_marker {
            out.push(line.to_string());
            i += 1;
            continue;
        }
        let mut joined = line.to_string();
        let mut j = i + 1;
        while j < lines.len() {
            let next = lines[j];
            let is_indented = next.starts_with(' ') || next.starts_with('\t');
            let is_bullet = next.trim_start().starts_with('-');
            let is_new_prefix = prefixes.iter().any(|p| next.trim_start().starts_with(p));
            if is_indented && !is_bullet && !is_new_prefix {
                joined.push('\n');
                joined.push_str(next.trim_start());
                j += 1;
            } else {
                break;
            }
        }
        out.push(joined);
        i = j;
    }
    out.join("\n")
}

fn build_fenced_regex(prefix: &str, target: &str) -> Regex {
    let escaped_prefix = regex::escape(prefix);
    let pattern = format!(
        r"(?s){escaped_prefix}{target}\s*<<<\r?\n?(.*?)\r?\n?>>>",
    );
    Regex::new(&pattern).expect("valid generated regex")
}

/// Extract every recognised command from cleaned (ANSI-stripped,
/// continuation-joined) output text.
///
/// Markers are consumed left-to-right in priority order so that, e.g., a
/// `->relay:spawn ...` line is never also picked up by the generic
/// single-target relay pattern.
pub fn find_commands(text: &str, relay_prefix: &str, continuity_prefix: &str) -> Vec<Command> {
    let mut commands = Vec::new();
    let mut consumed: Vec<(usize, usize)> = Vec::new();

    for caps in SUMMARY_BLOCK.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        consumed.push((m.start(), m.end()));
        commands.push((m.start(), Command::Summary { body: caps[1].to_string() }));
    }
    for caps in SESSION_END_BLOCK.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        consumed.push((m.start(), m.end()));
        commands.push((m.start(), Command::SessionEnd { body: caps[1].to_string() }));
    }

    let escaped_relay = regex::escape(relay_prefix);
    let escaped_continuity = regex::escape(continuity_prefix);

    // Spawn: fenced then single-line.
    let spawn_fenced = build_fenced_regex(relay_prefix, r"spawn\s+(\S+)\s+(\S+)");
    for caps in spawn_fenced.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((
            m.start(),
            Command::Spawn {
                name: caps[1].to_string(),
                cli: caps[2].to_string(),
                task: caps[3].trim().to_string(),
            },
        ));
    }
    let spawn_single = Regex::new(&format!(
        r#"(?m)^{escaped_relay}spawn\s+(\S+)\s+(\S+)\s+"([^"]*)"\s*$"#
    ))
    .expect("valid regex");
    for caps in spawn_single.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((
            m.start(),
            Command::Spawn {
                name: caps[1].to_string(),
                cli: caps[2].to_string(),
                task: caps[3].to_string(),
            },
        ));
    }

    // Release: single-line only.
    let release = Regex::new(&format!(r"(?m)^{escaped_relay}release\s+(\S+)\s*$"))
        .expect("valid regex");
    for caps in release.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((m.start(), Command::Release { name: caps[1].to_string() }));
    }

    // Channel membership: single-line only (spec §4.8).
    let channel_join = Regex::new(&format!(r"(?m)^{escaped_relay}join\s+(\S+)\s*$"))
        .expect("valid regex");
    for caps in channel_join.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((m.start(), Command::ChannelJoin { channel: caps[1].to_string() }));
    }
    let channel_leave = Regex::new(&format!(r"(?m)^{escaped_relay}leave\s+(\S+)\s*$"))
        .expect("valid regex");
    for caps in channel_leave.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((m.start(), Command::ChannelLeave { channel: caps[1].to_string() }));
    }

    // Continuity verbs.
    let save_fenced = build_fenced_regex(continuity_prefix, r"save(\s+--handoff)?");
    for caps in save_fenced.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((
            m.start(),
            Command::ContinuitySave {
                handoff: caps.get(1).is_some(),
                body: caps[2].to_string(),
            },
        ));
    }
    let handoff_fenced = build_fenced_regex(continuity_prefix, r"handoff");
    for caps in handoff_fenced.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((m.start(), Command::ContinuityHandoff { body: caps[1].to_string() }));
    }
    let search_quoted =
        Regex::new(&format!(r#"(?m)^{escaped_continuity}search\s+"([^"]*)"\s*$"#))
            .expect("valid regex");
    for caps in search_quoted.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((m.start(), Command::ContinuitySearch { query: caps[1].to_string() }));
    }
    let search_fenced = build_fenced_regex(continuity_prefix, r"search");
    for caps in search_fenced.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((
            m.start(),
            Command::ContinuitySearch { query: caps[1].trim().to_string() },
        ));
    }
    let uncertain =
        Regex::new(&format!(r#"(?m)^{escaped_continuity}uncertain\s+"([^"]*)"\s*$"#))
            .expect("valid regex");
    for caps in uncertain.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((m.start(), Command::ContinuityUncertain { item: caps[1].to_string() }));
    }
    let load = Regex::new(&format!(r"(?m)^{escaped_continuity}load\s*$")).expect("valid regex");
    for m in load.find_iter(text) {
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((m.start(), Command::ContinuityLoad));
    }

    // Generic relay: fenced then single-line.
    let relay_fenced = build_fenced_regex(relay_prefix, r"(\S+)");
    for caps in relay_fenced.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((
            m.start(),
            Command::Relay { to: caps[1].to_string(), body: caps[2].to_string() },
        ));
    }
    let relay_single =
        Regex::new(&format!(r"(?m)^{escaped_relay}(\S+)\s+(.+)$")).expect("valid regex");
    for caps in relay_single.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if overlaps(&consumed, m.start(), m.end()) {
            continue;
        }
        consumed.push((m.start(), m.end()));
        commands.push((
            m.start(),
            Command::Relay { to: caps[1].to_string(), body: caps[2].to_string() },
        ));
    }

    commands.sort_by_key(|(pos, _)| *pos);
    commands.into_iter().map(|(_, c)| c).collect()
}

fn overlaps(consumed: &[(usize, usize)], start: usize, end: usize) -> bool {
    consumed.iter().any(|&(s, e)| start < e && s < end)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
