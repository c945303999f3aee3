// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Central in-process router (spec §4.4). Keeps the teacher's
//! `Arc<RwLock<...>>`-guarded shared-state style for a single process
//! rather than routing over a network transport.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::channel::{self, ChannelRegistry, RecipientKind};
use super::Envelope;

const SENDER_HASH_CAPACITY: usize = 500;

/// Registry maintenance hook (spec §4.4: "On each successful publish the
/// Registry increments the sender's `messagesSent` and each recipient's
/// `messagesReceived`").
pub trait RegistryHook: Send + Sync {
    fn record_sent(&self, agent_name: &str);
    fn record_received(&self, agent_name: &str);
}

struct BoundedIdSet {
    capacity: usize,
    order: VecDeque<String>,
    set: std::collections::HashSet<String>,
}

impl BoundedIdSet {
    fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::new(), set: std::collections::HashSet::new() }
    }

    /// Returns `true` if `id` was newly inserted (not a repeat).
    fn insert(&mut self, id: String) -> bool {
        if !self.set.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }
}

struct SwitchboardState {
    recipients: HashMap<String, mpsc::UnboundedSender<Envelope>>,
    dedupe: HashMap<String, BoundedIdSet>,
    sender_hash_seen: BoundedIdSet,
    channels: ChannelRegistry,
}

/// In-process message router. `subscribe`/`unsubscribe` register the
/// per-agent delivery channel (backed by that agent's Injection Engine);
/// `publish` resolves `to` and fans an envelope out.
pub struct Switchboard {
    dedupe_capacity: usize,
    registry_hook: Option<Arc<dyn RegistryHook>>,
    state: RwLock<SwitchboardState>,
}

impl Switchboard {
    pub fn new(dedupe_capacity: usize) -> Self {
        Self {
            dedupe_capacity,
            registry_hook: None,
            state: RwLock::new(SwitchboardState {
                recipients: HashMap::new(),
                dedupe: HashMap::new(),
                sender_hash_seen: BoundedIdSet::new(SENDER_HASH_CAPACITY),
                channels: ChannelRegistry::new(),
            }),
        }
    }

    pub fn with_registry_hook(mut self, hook: Arc<dyn RegistryHook>) -> Self {
        self.registry_hook = Some(hook);
        self
    }

    /// Register `agent_name`'s inbound delivery channel. Called by each
    /// wrapper at start.
    pub fn subscribe(&self, agent_name: impl Into<String>, sender: mpsc::UnboundedSender<Envelope>) {
        self.state.write().recipients.insert(agent_name.into(), sender);
    }

    /// Deregister on stop.
    pub fn unsubscribe(&self, agent_name: &str) {
        let mut state = self.state.write();
        state.recipients.remove(agent_name);
        state.channels.leave_all(agent_name);
    }

    pub fn join_channel(&self, channel_id: &str, member: &str) {
        self.state.write().channels.join(channel_id, member);
    }

    pub fn leave_channel(&self, channel_id: &str, member: &str) {
        self.state.write().channels.leave(channel_id, member);
    }

    /// Pending (unconsumed) envelope count is tracked by each recipient's
    /// Injection Engine; the switchboard exposes only whether a name is
    /// currently known.
    pub fn is_known(&self, agent_name: &str) -> bool {
        self.state.read().recipients.contains_key(agent_name)
    }

    pub fn known_agents_excluding(&self, exclude: &str) -> Vec<String> {
        self.state
            .read()
            .recipients
            .keys()
            .filter(|name| name.as_str() != exclude)
            .cloned()
            .collect()
    }

    /// Route an envelope to its resolved recipients. Never blocks the
    /// publisher (spec §4.4): delivery channels are unbounded, and
    /// backpressure/overflow is the Injection Engine's job, not the
    /// relay's.
    pub fn publish(&self, envelope: Envelope) {
        let mut state = self.state.write();

        if !state.sender_hash_seen.insert(envelope.sender_hash()) {
            debug!(id = %envelope.id, "dropping envelope: sender-side hash already seen");
            return;
        }

        let recipients = match channel::classify(&envelope.to) {
            RecipientKind::Agent(name) => vec![name],
            RecipientKind::Broadcast => state
                .recipients
                .keys()
                .filter(|name| name.as_str() != envelope.from)
                .cloned()
                .collect(),
            RecipientKind::Channel(name) => {
                state.channels.members_excluding(&format!("#{name}"), &envelope.from)
            }
            RecipientKind::Dm(participants) => {
                let id = channel::canonical_dm(&participants);
                state.channels.members_excluding(&id, &envelope.from)
            }
            RecipientKind::Private(name) => {
                state.channels.members_excluding(&format!("private:{name}"), &envelope.from)
            }
        };

        let mut any_delivered = false;
        for recipient in recipients {
            let delivered = state
                .dedupe
                .entry(recipient.clone())
                .or_insert_with(|| BoundedIdSet::new(self.dedupe_capacity))
                .insert(envelope.id.clone());
            if !delivered {
                debug!(id = %envelope.id, %recipient, "dropping envelope: repeated id");
                continue;
            }
            match state.recipients.get(&recipient) {
                Some(tx) => {
                    let _ = tx.send(envelope.clone());
                    any_delivered = true;
                    if let Some(hook) = &self.registry_hook {
                        hook.record_received(&recipient);
                    }
                }
                None => {
                    warn!(%recipient, "publish target is not currently subscribed");
                }
            }
        }
        drop(state);
        if any_delivered {
            if let Some(hook) = &self.registry_hook {
                hook.record_sent(&envelope.from);
            }
        }
    }
}

#[cfg(test)]
#[path = "switchboard_tests.rs"]
mod tests;
