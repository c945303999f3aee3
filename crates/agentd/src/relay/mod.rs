// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message Relay / Switchboard (spec §4.4, §4.8): in-process router that
//! accepts envelopes parsed from agent output (or external callers) and
//! delivers them to one or more recipients as injections, broadcasts, or
//! channel fan-outs.

pub mod channel;
pub mod switchboard;

pub use channel::{canonical_dm, ChannelRegistry, RecipientKind};
pub use switchboard::Switchboard;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

static MONOTONIC_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Message kind (spec §3 "Message Envelope").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Message,
    Command,
    Notice,
}

/// Delivery priority; `Urgent` is exempt from overflow eviction (spec §4.3,
/// §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Importance {
    fn default() -> Self {
        Self::Normal
    }
}

/// Immutable record consumed by the relay (spec §3). Carries a denormalized
/// `channel` copy of the resolved channel identifier when `to` was a
/// channel form, so recipients don't need to re-parse `to` to learn whether
/// an envelope arrived via fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub ts: u64,
    pub from: String,
    pub to: String,
    pub kind: Kind,
    pub body: String,
    pub thread: Option<String>,
    pub data: serde_json::Value,
    pub importance: Importance,
    pub channel: Option<String>,
}

impl Envelope {
    pub fn new(from: impl Into<String>, to: impl Into<String>, body: impl Into<String>) -> Self {
        let to = to.into();
        let channel = match channel::classify(&to) {
            RecipientKind::Channel(name) => Some(format!("#{name}")),
            RecipientKind::Dm(participants) => Some(canonical_dm(&participants)),
            RecipientKind::Private(name) => Some(format!("private:{name}")),
            RecipientKind::Agent(_) | RecipientKind::Broadcast => None,
        };
        Self {
            id: Uuid::new_v4().to_string(),
            ts: MONOTONIC_COUNTER.fetch_add(1, Ordering::SeqCst),
            from: from.into(),
            to,
            kind: Kind::Message,
            body: body.into(),
            thread: None,
            data: serde_json::Value::Null,
            importance: Importance::Normal,
            channel,
        }
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn is_urgent(&self) -> bool {
        self.importance == Importance::Urgent
    }

    /// Sender-side dedupe hash: recipient plus the first 100 bytes of body
    /// (spec §4.4), guarding against a wrapper re-parsing the same output
    /// window and re-emitting a command.
    pub fn sender_hash(&self) -> String {
        let mut boundary = self.body.len().min(100);
        while boundary > 0 && !self.body.is_char_boundary(boundary) {
            boundary -= 1;
        }
        format!("{}:{}", self.to, &self.body[..boundary])
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
