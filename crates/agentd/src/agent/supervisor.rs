// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart policy (spec §4.7): decides whether a dead agent should be
//! restarted with a backoff delay or declared permanently dead, based on
//! how many restarts have happened inside a sliding window.

use std::collections::VecDeque;
use std::time::Duration;

const DEFAULT_BASE_BACKOFF_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Outcome of consulting the restart policy after an agent's process
/// exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart after the given backoff.
    Restart(Duration),
    /// `max_restarts` has been exceeded within `backoff_window`; give up.
    PermanentlyDead,
}

/// Tracks restart attempts for a single agent inside a sliding time
/// window and hands out exponential backoff decisions (spec §4.7:
/// "exponential backoff, base 1s, cap 30s" and "more than `maxRestarts`
/// within `backoffWindow` marks the agent permanently dead").
pub struct RestartPolicy {
    max_restarts: u32,
    backoff_window: Duration,
    base_backoff: Duration,
    max_backoff: Duration,
    attempts_ms: VecDeque<u64>,
}

impl RestartPolicy {
    pub fn new(max_restarts: u32, backoff_window: Duration) -> Self {
        Self {
            max_restarts,
            backoff_window,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            attempts_ms: VecDeque::new(),
        }
    }

    /// Record an exit at `now_ms` and decide whether to restart.
    pub fn decide(&mut self, now_ms: u64) -> RestartDecision {
        self.evict_expired(now_ms);
        self.attempts_ms.push_back(now_ms);
        let count = self.attempts_ms.len() as u32;
        if count > self.max_restarts {
            return RestartDecision::PermanentlyDead;
        }
        let exponent = count.saturating_sub(1).min(31);
        let backoff_ms = self
            .base_backoff
            .as_millis()
            .saturating_mul(1u128 << exponent)
            .min(self.max_backoff.as_millis());
        RestartDecision::Restart(Duration::from_millis(backoff_ms as u64))
    }

    /// Restarts recorded within the current window, for reporting.
    pub fn attempts_in_window(&self, now_ms: u64) -> u32 {
        self.attempts_ms.iter().filter(|&&t| now_ms.saturating_sub(t) <= self.window_ms()).count()
            as u32
    }

    fn evict_expired(&mut self, now_ms: u64) {
        let window_ms = self.window_ms();
        while let Some(&front) = self.attempts_ms.front() {
            if now_ms.saturating_sub(front) > window_ms {
                self.attempts_ms.pop_front();
            } else {
                break;
            }
        }
    }

    fn window_ms(&self) -> u64 {
        self.backoff_window.as_millis() as u64
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
