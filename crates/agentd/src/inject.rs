// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injection Engine (spec §4.3): delivers a queued message to a child PTY
//! as if a human had typed it, gated on the Idle Detector.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::idle::IdleDetector;
use crate::relay::Envelope;
use crate::wrapper::Wrapper;

/// One step of a rendered injection: bytes to write, then an optional
/// delay before the next step. Mirrors the teacher's `NudgeStep`
/// type/delay/submit shape.
#[derive(Debug, Clone)]
pub struct InjectionStep {
    pub bytes: Bytes,
    pub delay_after: Option<Duration>,
}

/// Render an envelope as a stable, human-readable block a recipient can
/// pattern-match out of band, followed by a submit sequence.
pub fn render(envelope: &Envelope, submit_delay: Duration) -> Vec<InjectionStep> {
    let mut block = String::new();
    block.push_str("[[RELAY]]\n");
    block.push_str(&format!("from: {}\n", envelope.from));
    if let Some(thread) = &envelope.thread {
        block.push_str(&format!("thread: {thread}\n"));
    }
    block.push_str(&envelope.body);
    block.push_str("\n[[/RELAY]]");

    vec![
        InjectionStep { bytes: Bytes::from(block), delay_after: Some(submit_delay) },
        InjectionStep { bytes: Bytes::from_static(b"\r"), delay_after: None },
    ]
}

struct QueuedMessage {
    envelope: Envelope,
    attempts: u32,
}

/// Aggregate counters exposed per agent (spec §4.3).
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct InjectionMetrics {
    pub total: u64,
    pub success_first_try: u64,
    pub success_with_retry: u64,
    pub failed: u64,
    pub average_wait_ms: f64,
}

impl InjectionMetrics {
    fn record_success(&mut self, attempts: u32, wait_ms: u64) {
        self.total += 1;
        if attempts <= 1 {
            self.success_first_try += 1;
        } else {
            self.success_with_retry += 1;
        }
        let delivered = (self.success_first_try + self.success_with_retry) as f64;
        self.average_wait_ms += (wait_ms as f64 - self.average_wait_ms) / delivered.max(1.0);
    }

    fn record_failure(&mut self) {
        self.total += 1;
        self.failed += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.success_first_try + self.success_with_retry) as f64 / self.total as f64
    }
}

struct QueueState {
    messages: VecDeque<QueuedMessage>,
    metrics: InjectionMetrics,
}

/// Per-recipient bounded FIFO plus the idle-gated delivery loop.
pub struct InjectionEngine {
    capacity: usize,
    inject_timeout: Duration,
    max_attempts: u32,
    submit_delay: Duration,
    state: Mutex<QueueState>,
}

impl InjectionEngine {
    pub fn new(
        capacity: usize,
        inject_timeout: Duration,
        max_attempts: u32,
        submit_delay: Duration,
    ) -> Self {
        Self {
            capacity,
            inject_timeout,
            max_attempts,
            submit_delay,
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                metrics: InjectionMetrics::default(),
            }),
        }
    }

    /// Enqueue a message. Overflow policy: drop the oldest non-urgent
    /// message; if every queued message is urgent, drop the oldest urgent
    /// one instead of refusing the incoming message (spec §4.3, §5).
    pub fn enqueue(&self, envelope: Envelope) {
        let mut state = self.state.lock();
        if state.messages.len() >= self.capacity {
            let dropped_index = state.messages.iter().position(|m| !m.envelope.is_urgent());
            let dropped = match dropped_index {
                Some(idx) => state.messages.remove(idx).expect("index in bounds"),
                None => state.messages.pop_front().expect("queue at capacity is non-empty"),
            };
            warn!(
                recipient = %dropped.envelope.to,
                dropped_id = %dropped.envelope.id,
                urgent = dropped.envelope.is_urgent(),
                "injection queue full, dropped oldest message"
            );
        }
        state.messages.push_back(QueuedMessage { envelope, attempts: 0 });
    }

    pub fn pending(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn metrics(&self) -> InjectionMetrics {
        self.state.lock().metrics
    }

    /// Drain the queue, reporting `injection-failed` for each remaining
    /// message (spec §4.1: "a process that exits mid-injection discards
    /// its queue with per-message `injection-failed` notifications").
    pub async fn discard_all(&self, wrapper: &Wrapper) {
        let drained: Vec<QueuedMessage> = {
            let mut state = self.state.lock();
            state.messages.drain(..).collect()
        };
        for message in drained {
            wrapper.report_injection_failed(message.envelope.id, message.attempts.max(1)).await;
        }
    }

    /// Run the idle-gated delivery loop until `shutdown` fires. One
    /// instance per agent; a per-wrapper `isInjecting` state (tracked on
    /// the wrapper itself) ensures only one injection is in flight.
    pub async fn run(&self, wrapper: Wrapper, idle: IdleDetector, shutdown: CancellationToken) {
        loop {
            let next = {
                let state = self.state.lock();
                state.messages.front().map(|m| m.envelope.clone())
            };
            let Some(envelope) = next else {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
                    _ = shutdown.cancelled() => return,
                }
            };

            let wait_start = tokio::time::Instant::now();
            let idle_result = tokio::select! {
                result = idle.wait_for_idle(self.inject_timeout, Duration::from_millis(100)) => result,
                _ = shutdown.cancelled() => return,
            };

            if !idle_result.is_idle {
                let attempts = {
                    let mut state = self.state.lock();
                    if let Some(front) = state.messages.front_mut() {
                        front.attempts += 1;
                        front.attempts
                    } else {
                        continue;
                    }
                };
                if attempts >= self.max_attempts {
                    let popped = {
                        let mut state = self.state.lock();
                        let popped = state.messages.pop_front();
                        if popped.is_some() {
                            state.metrics.record_failure();
                        }
                        popped
                    };
                    if let Some(message) = popped {
                        wrapper.report_injection_failed(message.envelope.id, attempts).await;
                    }
                } else {
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempts.min(5)))
                        .min(Duration::from_secs(2));
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            wrapper.set_injecting(true).await;
            let steps = render(&envelope, self.submit_delay);
            let mut write_failed = false;
            for step in steps {
                if wrapper.write(step.bytes).await.is_err() {
                    write_failed = true;
                    break;
                }
                if let Some(delay) = step.delay_after {
                    tokio::time::sleep(delay).await;
                }
            }
            wrapper.set_injecting(false).await;

            let failed_delivery = {
                let mut state = self.state.lock();
                let Some(message) = state.messages.pop_front() else { continue };
                if write_failed {
                    if message.attempts + 1 >= self.max_attempts {
                        state.metrics.record_failure();
                        Some((message.envelope.id, message.attempts + 1))
                    } else {
                        state.messages.push_front(QueuedMessage {
                            envelope: message.envelope,
                            attempts: message.attempts + 1,
                        });
                        None
                    }
                } else {
                    let wait_ms = wait_start.elapsed().as_millis() as u64;
                    state.metrics.record_success(message.attempts + 1, wait_ms);
                    None
                }
            };
            if let Some((id, attempts)) = failed_delivery {
                wrapper.report_injection_failed(id, attempts).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "inject_tests.rs"]
mod tests;
