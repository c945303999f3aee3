// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel identifier parsing and membership tracking (spec §4.8).

use std::collections::{HashMap, HashSet};

/// How a `to` field resolves to a set of recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientKind {
    Agent(String),
    Broadcast,
    Channel(String),
    Dm(Vec<String>),
    Private(String),
}

/// Classify a raw `to` string into its recipient kind (spec §4.8: public
/// `#<name>`, direct-message `dm:<p1>:<p2>[:…]`, private `private:<name>`).
pub fn classify(to: &str) -> RecipientKind {
    if to == "*" {
        return RecipientKind::Broadcast;
    }
    if let Some(name) = to.strip_prefix('#') {
        return RecipientKind::Channel(name.to_string());
    }
    if let Some(rest) = to.strip_prefix("dm:") {
        let participants: Vec<String> = rest.split(':').map(|s| s.to_string()).collect();
        return RecipientKind::Dm(participants);
    }
    if let Some(name) = to.strip_prefix("private:") {
        return RecipientKind::Private(name.to_string());
    }
    RecipientKind::Agent(to.to_string())
}

/// Canonicalize a DM channel id with participants sorted lexicographically.
pub fn canonical_dm(participants: &[String]) -> String {
    let mut sorted = participants.to_vec();
    sorted.sort();
    format!("dm:{}", sorted.join(":"))
}

/// Tracks current membership for public, DM, and private channel
/// identifiers. Membership is updated by the agent manager's dispatch of
/// parsed `->relay:join`/`->relay:leave` markers (spec §4.8); this
/// registry just stores the result.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    members: HashMap<String, HashSet<String>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, channel_id: &str, member: &str) {
        self.members.entry(channel_id.to_string()).or_default().insert(member.to_string());
    }

    pub fn leave(&mut self, channel_id: &str, member: &str) {
        if let Some(set) = self.members.get_mut(channel_id) {
            set.remove(member);
            if set.is_empty() {
                self.members.remove(channel_id);
            }
        }
    }

    /// Drop a member from every channel it belongs to (spec §4: "offlineTtl
    /// eviction drops a recipient from all channels").
    pub fn leave_all(&mut self, member: &str) {
        self.members.retain(|_, set| {
            set.remove(member);
            !set.is_empty()
        });
    }

    /// Current members of a channel, excluding `exclude` (the sender).
    pub fn members_excluding(&self, channel_id: &str, exclude: &str) -> Vec<String> {
        self.members
            .get(channel_id)
            .map(|set| set.iter().filter(|m| m.as_str() != exclude).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
