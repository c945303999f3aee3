// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle detector (spec §4.2): decides whether a child PTY is in an
//! input-accepting quiescent state, with a confidence in `[0, 1]`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static PROMPT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\x{2502}\s*>\s*$").expect("valid regex"), // "│ > " variants
        Regex::new(r">\s*$").expect("valid regex"),
        Regex::new(r"\$\s*$").expect("valid regex"),
        Regex::new(r"#\s*$").expect("valid regex"),
    ]
});

static ESCAPE_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid regex"));

/// One independently-weighted idle signal.
#[derive(Debug, Clone, Serialize)]
pub struct IdleSignalReading {
    pub name: &'static str,
    pub confidence: f64,
}

/// Outcome of an idle check.
#[derive(Debug, Clone, Serialize)]
pub struct IdleResult {
    pub is_idle: bool,
    pub confidence: f64,
    pub signals: Vec<IdleSignalReading>,
}

/// Mutable state tracked by the detector as output streams in.
struct IdleState {
    last_output_at: Instant,
    last_chunk_tail: String,
    pid: Option<u32>,
}

/// Per-agent idle detector. Cheap to clone (shares state via `Arc`).
#[derive(Clone)]
pub struct IdleDetector {
    min_silence: Duration,
    threshold: f64,
    state: Arc<RwLock<IdleState>>,
}

impl IdleDetector {
    pub fn new(min_silence: Duration, threshold: f64) -> Self {
        Self {
            min_silence,
            threshold,
            state: Arc::new(RwLock::new(IdleState {
                last_output_at: Instant::now(),
                last_chunk_tail: String::new(),
                pid: None,
            })),
        }
    }

    /// Record a chunk of (ANSI-stripped) output, resetting the silence
    /// clock. Call this for every chunk, including during injection.
    pub fn record_output(&self, stripped_chunk: &str) {
        let mut state = self.state.write();
        state.last_output_at = Instant::now();
        let tail_start = stripped_chunk.len().saturating_sub(256);
        state.last_chunk_tail = stripped_chunk[tail_start..].to_string();
    }

    pub fn set_pid(&self, pid: Option<u32>) {
        self.state.write().pid = pid;
    }

    /// Evaluate idleness right now, combined by the maximum of a weighted
    /// sum across signals and a hard minimum-silence gate (spec §4.2).
    pub fn check_idle(&self, min_silence_override: Option<Duration>) -> IdleResult {
        let min_silence = min_silence_override.unwrap_or(self.min_silence);
        let state = self.state.read();
        let elapsed = state.last_output_at.elapsed();

        let mut signals = Vec::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        let silence = silence_confidence(elapsed, min_silence);
        signals.push(IdleSignalReading { name: "silence", confidence: silence });
        weighted_sum += silence * 0.4;
        weight_total += 0.4;

        let cursor = cursor_confidence(&state.last_chunk_tail);
        signals.push(IdleSignalReading { name: "tui_cursor", confidence: cursor });
        weighted_sum += cursor * 0.35;
        weight_total += 0.35;

        if let Some(pid) = state.pid {
            if let Some(confidence) = process_state_confidence(pid) {
                signals.push(IdleSignalReading { name: "process_state", confidence });
                weighted_sum += confidence * 0.15;
                weight_total += 0.15;
            }
        }

        let no_spinner = absence_of_escape_confidence(&state.last_chunk_tail);
        signals.push(IdleSignalReading { name: "no_active_drawing", confidence: no_spinner });
        weighted_sum += no_spinner * 0.10;
        weight_total += 0.10;

        let weighted_average = if weight_total > 0.0 { weighted_sum / weight_total } else { 0.0 };
        let hard_gate = if elapsed >= min_silence * 3 { 1.0 } else { 0.0 };
        let confidence = weighted_average.max(hard_gate).min(1.0);

        IdleResult { is_idle: confidence >= self.threshold, confidence, signals }
    }

    /// Poll until confidence reaches the threshold or `timeout` elapses.
    pub async fn wait_for_idle(&self, timeout: Duration, poll: Duration) -> IdleResult {
        let deadline = Instant::now() + timeout;
        loop {
            let result = self.check_idle(None);
            if result.is_idle || Instant::now() >= deadline {
                return result;
            }
            tokio::time::sleep(poll).await;
        }
    }
}

fn silence_confidence(elapsed: Duration, min_silence: Duration) -> f64 {
    if elapsed < min_silence {
        return 0.0;
    }
    let span = min_silence.as_secs_f64() * 2.0;
    if span <= 0.0 {
        return 1.0;
    }
    let over = (elapsed - min_silence).as_secs_f64();
    (over / span).min(1.0)
}

fn cursor_confidence(tail: &str) -> f64 {
    if PROMPT_PATTERNS.iter().any(|r| r.is_match(tail)) {
        1.0
    } else {
        0.0
    }
}

fn absence_of_escape_confidence(tail: &str) -> f64 {
    if ESCAPE_SEQUENCE.is_match(tail) {
        0.0
    } else {
        1.0
    }
}

/// Linux-only `/proc/<pid>/stat` process-state signal (spec §4.2: "Linux
/// only, optional"). Returns `None` when unavailable so the caller can
/// exclude it from the weighted sum rather than treating it as "not idle".
#[cfg(target_os = "linux")]
fn process_state_confidence(pid: u32) -> Option<f64> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // Field 3 (after the `(comm)` field, which may itself contain spaces
    // and parentheses) is the state character.
    let after_comm = contents.rsplit_once(')')?.1;
    let state = after_comm.trim_start().chars().next()?;
    Some(if state == 'S' || state == 'T' { 1.0 } else { 0.0 })
}

#[cfg(not(target_os = "linux"))]
fn process_state_confidence(_pid: u32) -> Option<f64> {
    None
}

#[cfg(test)]
#[path = "idle_tests.rs"]
mod tests;
