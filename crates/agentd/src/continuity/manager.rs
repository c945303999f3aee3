// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatches `->continuity:` commands parsed from agent output, mediating
//! between the Parser and the Injection Engine (spec §4.6).

use std::collections::VecDeque;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::parser::{parse_save_block, Command, Denylist};

use super::LedgerStore;

const DEDUPE_CAPACITY: usize = 100;
const SEARCH_RESULT_LIMIT: usize = 5;

struct DedupeSet {
    order: VecDeque<String>,
    seen: std::collections::HashSet<String>,
}

impl DedupeSet {
    fn new() -> Self {
        Self { order: VecDeque::new(), seen: std::collections::HashSet::new() }
    }

    fn insert(&mut self, key: String) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        if self.order.len() > DEDUPE_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

/// Outcome of dispatching a continuity command: text to reinject into the
/// originating agent, if any.
pub struct DispatchResult {
    pub reinject: Option<String>,
}

impl DispatchResult {
    fn none() -> Self {
        Self { reinject: None }
    }

    fn text(body: impl Into<String>) -> Self {
        Self { reinject: Some(body.into()) }
    }
}

pub struct ContinuityManager {
    store: LedgerStore,
    denylist: Denylist,
    dedupe: Mutex<DedupeSet>,
}

impl ContinuityManager {
    pub fn new(store: LedgerStore) -> Self {
        Self { store, denylist: Denylist::default(), dedupe: Mutex::new(DedupeSet::new()) }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Dispatch a parsed continuity command for `agent_name`. Returns
    /// `None` (already handled) for commands that are not continuity
    /// verbs.
    pub async fn dispatch(&self, agent_name: &str, command: &Command) -> Option<DispatchResult> {
        let dedupe_key = self.dedupe_key(command);
        if let Some(key) = dedupe_key {
            if !self.dedupe.lock().insert(key) {
                return Some(DispatchResult::none());
            }
        }

        match command {
            Command::ContinuitySave { body, .. } => {
                let update = parse_save_block(body, &self.denylist);
                let _ = self
                    .store
                    .update(agent_name, |ledger| ledger.merge_update(update))
                    .await;
                Some(DispatchResult::none())
            }
            Command::ContinuityHandoff { body } => {
                let update = parse_save_block(body, &self.denylist);
                let _ = self
                    .store
                    .update(agent_name, |ledger| ledger.merge_update(update))
                    .await;
                Some(DispatchResult::none())
            }
            Command::ContinuityLoad => {
                let rendered = self.store.load(agent_name).map(|l| l.render_compact());
                Some(match rendered {
                    Some(text) => DispatchResult::text(text),
                    None => DispatchResult::none(),
                })
            }
            Command::ContinuitySearch { query } => {
                let matches = self.store.search(query, SEARCH_RESULT_LIMIT);
                if matches.is_empty() {
                    return Some(DispatchResult::none());
                }
                let rendered = matches
                    .iter()
                    .map(|l| format!("{}: {}", l.agent_name, l.render_compact().trim()))
                    .collect::<Vec<_>>()
                    .join("\n---\n");
                Some(DispatchResult::text(rendered))
            }
            Command::ContinuityUncertain { item } => {
                let item = item.clone();
                let _ = self
                    .store
                    .update(agent_name, |ledger| {
                        ledger.add_to_list(super::ListField::Uncertain, item.clone())
                    })
                    .await;
                Some(DispatchResult::none())
            }
            _ => None,
        }
    }

    /// Merge a `[[SUMMARY]]` body into an agent's ledger using the same
    /// save-block grammar as `->continuity:save` (spec §4.5's field map
    /// applies wherever a `Current task:`/`Completed:`-shaped block shows
    /// up, not only behind the explicit verb).
    pub async fn merge_summary(&self, agent_name: &str, body: &str) {
        let update = parse_save_block(body, &self.denylist);
        if update.is_empty() {
            return;
        }
        let _ = self.store.update(agent_name, |ledger| ledger.merge_update(update)).await;
    }

    fn dedupe_key(&self, command: &Command) -> Option<String> {
        let (verb, body) = match command {
            Command::ContinuitySave { body, handoff } => {
                (if *handoff { "save-handoff" } else { "save" }, body.as_str())
            }
            Command::ContinuityHandoff { body } => ("handoff", body.as_str()),
            Command::ContinuityLoad => ("load", ""),
            Command::ContinuitySearch { query } => ("search", query.as_str()),
            Command::ContinuityUncertain { item } => ("uncertain", item.as_str()),
            _ => return None,
        };
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        let digest = hasher.finalize();
        let hash = digest.iter().take(8).map(|b| format!("{b:02x}")).collect::<String>();
        Some(format!("{verb}:{hash}"))
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
