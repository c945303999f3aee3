// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash Insights (spec §4.7): classifies why an agent died, maintains a
//! bounded history, and derives a health score.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const HISTORY_CAPACITY: usize = 1000;
const PATTERN_THRESHOLD: usize = 3;
const MEMORY_SAMPLE_HISTORY: usize = 20;

/// Likely root cause of a crash (spec §3 "Crash Record").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashCause {
    Oom,
    MemoryLeak,
    SuddenSpike,
    Signal,
    Error,
    Unknown,
}

/// Memory samples observed up to the moment of death.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryContext {
    pub peak_rss_kb: u64,
    pub trend_rising: bool,
    pub recent_samples_kb: Vec<u64>,
    pub baseline_kb: u64,
}

/// One crash observation (spec §3 "Crash Record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashRecord {
    pub id: String,
    pub agent_name: String,
    pub pid: Option<u32>,
    pub crash_time_ms: u64,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub memory: MemoryContext,
    pub output_tail: String,
    pub likely_cause: CrashCause,
    pub confidence: f64,
}

fn classify(
    exit_code: Option<i32>,
    signal: Option<i32>,
    memory: &MemoryContext,
    output_tail: &str,
) -> (CrashCause, f64) {
    const SIGKILL: i32 = 9;
    const SIGSEGV: i32 = 11;
    const SIGILL: i32 = 4;
    const SIGBUS: i32 = 7;

    if signal == Some(SIGKILL) || exit_code == Some(137) {
        return (CrashCause::Oom, 0.9);
    }
    if output_tail.contains("CALL_AND_RETRY_LAST") {
        return (CrashCause::Oom, 0.85);
    }
    let rising_near_peak = memory.trend_rising
        && memory.baseline_kb > 0
        && memory.peak_rss_kb as f64 > memory.baseline_kb as f64 * 1.5;
    if rising_near_peak {
        return (CrashCause::MemoryLeak, 0.7);
    }
    if let (Some(&last), Some(baseline)) =
        (memory.recent_samples_kb.last(), (memory.baseline_kb > 0).then_some(memory.baseline_kb))
    {
        if last as f64 > baseline as f64 * 2.0 {
            return (CrashCause::SuddenSpike, 0.6);
        }
    }
    if matches!(signal, Some(SIGSEGV) | Some(SIGILL) | Some(SIGBUS)) {
        return (CrashCause::Error, 0.75);
    }
    if signal.is_some() {
        return (CrashCause::Signal, 0.65);
    }
    (CrashCause::Unknown, 0.3)
}

impl CrashRecord {
    pub fn new(
        agent_name: impl Into<String>,
        pid: Option<u32>,
        exit_code: Option<i32>,
        signal: Option<i32>,
        memory: MemoryContext,
        output_tail: impl Into<String>,
    ) -> Self {
        let output_tail = output_tail.into();
        let (likely_cause, confidence) = classify(exit_code, signal, &memory, &output_tail);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_name: agent_name.into(),
            pid,
            crash_time_ms: now_ms(),
            exit_code,
            signal,
            memory,
            output_tail,
            likely_cause,
            confidence,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Periodic RSS samples for one live process, so a `MemoryContext` can be
/// built from real history at the moment of death instead of defaulting to
/// all zeroes.
pub struct MemorySampler {
    baseline_kb: AtomicU64,
    samples: Mutex<VecDeque<u64>>,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self { baseline_kb: AtomicU64::new(0), samples: Mutex::new(VecDeque::new()) }
    }

    /// Record one RSS sample in KB. The first sample recorded becomes the
    /// baseline against which later spikes and leaks are judged.
    pub fn record(&self, rss_kb: u64) {
        let _ = self.baseline_kb.compare_exchange(0, rss_kb, Ordering::Relaxed, Ordering::Relaxed);
        let mut samples = self.samples.lock();
        samples.push_back(rss_kb);
        if samples.len() > MEMORY_SAMPLE_HISTORY {
            samples.pop_front();
        }
    }

    pub fn snapshot(&self) -> MemoryContext {
        let samples = self.samples.lock();
        let peak_rss_kb = samples.iter().copied().max().unwrap_or(0);
        let trend_rising = match (samples.front(), samples.back()) {
            (Some(&first), Some(&last)) => last > first,
            _ => false,
        };
        MemoryContext {
            peak_rss_kb,
            trend_rising,
            recent_samples_kb: samples.iter().copied().collect(),
            baseline_kb: self.baseline_kb.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Linux-only `/proc/<pid>/status` RSS read, mirroring the idle detector's
/// `/proc/<pid>/stat` process-state read.
#[cfg(target_os = "linux")]
pub fn read_rss_kb(pid: u32) -> Option<u64> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest.trim().split_whitespace().next()?.parse().ok();
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
pub fn read_rss_kb(_pid: u32) -> Option<u64> {
    None
}

/// A derived pattern: the same cause recurring at least
/// [`PATTERN_THRESHOLD`] times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashPattern {
    pub cause: CrashCause,
    pub occurrences: usize,
    pub related_ids: Vec<String>,
}

/// Bounded, in-memory crash history with health scoring (spec §4.7).
#[derive(Default)]
pub struct CrashInsights {
    history: VecDeque<CrashRecord>,
    pending_critical_alert: bool,
}

impl CrashInsights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: CrashRecord) {
        self.history.push_back(record);
        if self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }

    pub fn set_pending_critical_alert(&mut self, pending: bool) {
        self.pending_critical_alert = pending;
    }

    pub fn history(&self) -> impl Iterator<Item = &CrashRecord> {
        self.history.iter()
    }

    /// Causes recurring at least [`PATTERN_THRESHOLD`] times across the
    /// whole bounded history.
    pub fn patterns(&self) -> Vec<CrashPattern> {
        let mut by_cause: std::collections::HashMap<CrashCause, Vec<String>> =
            std::collections::HashMap::new();
        for record in &self.history {
            by_cause.entry(record.likely_cause).or_default().push(record.id.clone());
        }
        by_cause
            .into_iter()
            .filter(|(_, ids)| ids.len() >= PATTERN_THRESHOLD)
            .map(|(cause, related_ids)| CrashPattern {
                cause,
                occurrences: related_ids.len(),
                related_ids,
            })
            .collect()
    }

    /// Health score in `[0, 100]` (spec §4.7): 100 minus penalties (OOM ×
    /// 15, leak × 10, other × 5, pending critical alert × 8), clamped.
    pub fn health_score(&self) -> u8 {
        let mut score = 100i32;
        for record in &self.history {
            score -= match record.likely_cause {
                CrashCause::Oom => 15,
                CrashCause::MemoryLeak => 10,
                _ => 5,
            };
        }
        if self.pending_critical_alert {
            score -= 8;
        }
        score.clamp(0, 100) as u8
    }
}

#[cfg(test)]
#[path = "crash_tests.rs"]
mod tests;
