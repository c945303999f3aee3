// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Grammar for `->continuity:save`/`->continuity:handoff` bodies (spec §4.5
//! "Save-block grammar" and "Section/field map").

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::denylist::Denylist;

/// A single `{path, optional line range}` entry parsed from a `files`
/// section (spec §3 `fileContext`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContextEntry {
    pub path: String,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
}

/// The set of ledger-shaped updates extracted from one save block. Field
/// names already normalized per the spec's section/field map; denylisted
/// items never make it into this structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub current_task: Option<String>,
    pub completed: Vec<String>,
    pub in_progress: Vec<String>,
    pub blocked: Vec<String>,
    pub key_decisions: Vec<String>,
    pub uncertain_items: Vec<String>,
    pub file_context: Vec<FileContextEntry>,
}

impl LedgerUpdate {
    pub fn is_empty(&self) -> bool {
        self.current_task.is_none()
            && self.completed.is_empty()
            && self.in_progress.is_empty()
            && self.blocked.is_empty()
            && self.key_decisions.is_empty()
            && self.uncertain_items.is_empty()
            && self.file_context.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    CurrentTask,
    Completed,
    InProgress,
    Blocked,
    KeyDecisions,
    Uncertain,
    FileContext,
}

fn normalize_field(raw: &str) -> Option<Field> {
    match raw.trim().to_lowercase().as_str() {
        "current task" | "task" | "working on" => Some(Field::CurrentTask),
        "completed" | "done" | "finished" | "previously completed" => Some(Field::Completed),
        "in progress" | "working" | "ongoing" | "next" | "next steps" | "todo" => {
            Some(Field::InProgress)
        }
        "blocked" | "blockers" | "stuck" => Some(Field::Blocked),
        "key decision" | "key decisions" | "decisions" | "decided" | "prior decisions" => {
            Some(Field::KeyDecisions)
        }
        "uncertain" | "unconfirmed" | "needs verification" | "to verify" => Some(Field::Uncertain),
        "files" | "file context" | "relevant files" | "key files" => Some(Field::FileContext),
        _ => None,
    }
}

static SECTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{2,3}\s+(.+?)\s*$").expect("valid regex"));
static BOLD_KV_TRAILING_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*([^*:]+):\*\*\s*(.*)$").expect("valid regex"));
static BOLD_KV_LEADING_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*([^*:]+)\*\*:\s*(.*)$").expect("valid regex"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-\s+(.*)$").expect("valid regex"));
static PLAIN_KV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:\n]{2,}?):\s*(.*)$").expect("valid regex"));
static FILE_CONTEXT_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)(?::(\d+)(?:-(\d+))?)?$").expect("valid regex"));

fn strip_bullet_glyph(s: &str) -> &str {
    let s = s.trim_start();
    for glyph in ["✓", "⚠", "❓"] {
        if let Some(rest) = s.strip_prefix(glyph) {
            return rest.trim_start();
        }
    }
    s
}

fn parse_file_context(value: &str) -> Option<FileContextEntry> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let caps = FILE_CONTEXT_ENTRY.captures(value)?;
    let path = caps.get(1)?.as_str().to_string();
    let start_line = caps.get(2).and_then(|m| m.as_str().parse().ok());
    let end_line = caps.get(3).and_then(|m| m.as_str().parse().ok());
    Some(FileContextEntry { path, start_line, end_line })
}

fn route(update: &mut LedgerUpdate, field: Field, value: &str, denylist: &Denylist) {
    let value = strip_bullet_glyph(value).trim();
    match field {
        Field::CurrentTask => {
            if !denylist.is_placeholder(value) {
                update.current_task = Some(value.to_string());
            }
        }
        Field::Completed => push_if_valid(&mut update.completed, value, denylist),
        Field::InProgress => push_if_valid(&mut update.in_progress, value, denylist),
        Field::Blocked => push_if_valid(&mut update.blocked, value, denylist),
        Field::KeyDecisions => push_if_valid(&mut update.key_decisions, value, denylist),
        Field::Uncertain => push_if_valid(&mut update.uncertain_items, value, denylist),
        Field::FileContext => {
            if let Some(entry) = parse_file_context(value) {
                if !denylist.is_placeholder(&entry.path) {
                    update.file_context.push(entry);
                }
            }
        }
    }
}

/// Split a list-field value on commas, since agents commonly emit
/// `Completed: login, onboarding, ...` on one line rather than one bullet
/// per item; each resulting item is filtered independently so a single
/// placeholder entry doesn't poison the real ones beside it.
fn push_if_valid(list: &mut Vec<String>, value: &str, denylist: &Denylist) {
    for item in value.split(',') {
        let item = item.trim();
        if !item.is_empty() && !denylist.is_placeholder(item) {
            list.push(item.to_string());
        }
    }
}

/// Parse a save/handoff body into a [`LedgerUpdate`], applying the
/// placeholder filter to every extracted item (spec §4.5, §8 boundary
/// behaviour "Save block with only placeholder items leaves the ledger
/// unchanged").
pub fn parse_save_block(body: &str, denylist: &Denylist) -> LedgerUpdate {
    let mut update = LedgerUpdate::default();
    let mut current_section: Option<Field> = None;

    for raw_line in body.lines() {
        let line = raw_line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = SECTION_HEADER.captures(line) {
            current_section = normalize_field(&caps[1]);
            continue;
        }

        if let Some(caps) = BOLD_KV_TRAILING_COLON.captures(line) {
            apply_kv(&mut update, &mut current_section, &caps[1], &caps[2], denylist);
            continue;
        }
        if let Some(caps) = BOLD_KV_LEADING_COLON.captures(line) {
            apply_kv(&mut update, &mut current_section, &caps[1], &caps[2], denylist);
            continue;
        }

        if let Some(caps) = BULLET.captures(line) {
            if let Some(field) = current_section {
                route(&mut update, field, &caps[1], denylist);
            }
            continue;
        }

        if let Some(caps) = PLAIN_KV.captures(line) {
            let field_name = &caps[1];
            if !field_name.contains('/') && !field_name.contains('\\') && !field_name.contains('`')
            {
                apply_kv(&mut update, &mut current_section, field_name, &caps[2], denylist);
            }
        }
    }

    update
}

fn apply_kv(
    update: &mut LedgerUpdate,
    current_section: &mut Option<Field>,
    field_name: &str,
    value: &str,
    denylist: &Denylist,
) {
    let Some(field) = normalize_field(field_name) else {
        *current_section = None;
        return;
    };
    *current_section = Some(field);
    if !value.trim().is_empty() {
        route(update, field, value, denylist);
    }
}

#[cfg(test)]
#[path = "save_block_tests.rs"]
mod tests;
