// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Continuity Ledger (spec §4.6): durable per-agent state that survives
//! crashes, with restart-time context reinjection.

pub mod manager;
pub mod store;

pub use manager::ContinuityManager;
pub use store::LedgerStore;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::parser::FileContextEntry;

/// A single timestamped decision (spec §3 "Ledger": `keyDecisions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub text: String,
    pub timestamp_ms: u64,
}

/// Per-agent persistent record (spec §3 "Ledger").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub agent_name: String,
    pub agent_id: String,
    pub session_id: String,
    pub cli: String,
    pub current_task: Option<String>,
    pub completed: Vec<String>,
    pub in_progress: Vec<String>,
    pub blocked: Vec<String>,
    pub uncertain_items: Vec<String>,
    pub file_context: Vec<FileContextEntry>,
    pub key_decisions: Vec<Decision>,
    pub updated_at_ms: u64,
}

impl Ledger {
    pub fn new(
        agent_name: impl Into<String>,
        cli: impl Into<String>,
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            cli: cli.into(),
            current_task: None,
            completed: Vec::new(),
            in_progress: Vec::new(),
            blocked: Vec::new(),
            uncertain_items: Vec::new(),
            file_context: Vec::new(),
            key_decisions: Vec::new(),
            updated_at_ms: now_ms(),
        }
    }

    /// Idempotent insertion into one of the list fields (spec §4.6
    /// `addToList`).
    pub fn add_to_list(&mut self, field: ListField, item: impl Into<String>) {
        let item = item.into();
        let list = match field {
            ListField::Completed => &mut self.completed,
            ListField::InProgress => &mut self.in_progress,
            ListField::Blocked => &mut self.blocked,
            ListField::Uncertain => &mut self.uncertain_items,
        };
        if !list.iter().any(|existing| existing == &item) {
            list.push(item);
        }
        self.touch();
    }

    pub fn add_decision(&mut self, text: impl Into<String>) {
        self.key_decisions.push(Decision { text: text.into(), timestamp_ms: now_ms() });
        self.touch();
    }

    /// Merge a parsed save-block update in place. `agent_id`/`agent_name`
    /// are never overwritten (spec §4.6: "preserved").
    pub fn merge_update(&mut self, update: crate::parser::LedgerUpdate) {
        if let Some(task) = update.current_task {
            self.current_task = Some(task);
        }
        for item in update.completed {
            self.add_to_list(ListField::Completed, item);
        }
        for item in update.in_progress {
            self.add_to_list(ListField::InProgress, item);
        }
        for item in update.blocked {
            self.add_to_list(ListField::Blocked, item);
        }
        for item in update.uncertain_items {
            self.add_to_list(ListField::Uncertain, item);
        }
        for decision in update.key_decisions {
            self.add_decision(decision);
        }
        for entry in update.file_context {
            if !self.file_context.iter().any(|existing| existing.path == entry.path) {
                self.file_context.push(entry);
            }
        }
        self.touch();
    }

    /// Render a compact human-readable block for `->continuity:load`
    /// reinjection (spec §4.6).
    pub fn render_compact(&self) -> String {
        let mut out = String::new();
        if let Some(task) = &self.current_task {
            out.push_str(&format!("Current task: {task}\n"));
        }
        if !self.completed.is_empty() {
            let tail: Vec<&String> = self.completed.iter().rev().take(3).collect();
            out.push_str(&format!("Recently completed: {}\n", join_rev(&tail)));
        }
        if !self.in_progress.is_empty() {
            out.push_str(&format!("In progress: {}\n", self.in_progress.join(", ")));
        }
        if !self.uncertain_items.is_empty() {
            out.push_str(&format!("Uncertain: {}\n", self.uncertain_items.join(", ")));
        }
        out
    }

    fn touch(&mut self) {
        self.updated_at_ms = self.updated_at_ms.max(now_ms());
    }
}

fn join_rev(items: &[&String]) -> String {
    items.iter().rev().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone, Copy)]
pub enum ListField {
    Completed,
    InProgress,
    Blocked,
    Uncertain,
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
