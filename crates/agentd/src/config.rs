// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Local orchestrator for multiple long-running interactive CLI agents.
#[derive(Debug, Clone, Parser)]
#[command(name = "agentd", version, about)]
pub struct Config {
    /// Directory holding per-agent ledgers, the agent-id index, and the
    /// agent registry.
    #[arg(long, env = "AGENTD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Terminal columns for spawned PTYs.
    #[arg(long, env = "AGENTD_COLS", default_value = "120")]
    pub cols: u16,

    /// Terminal rows for spawned PTYs.
    #[arg(long, env = "AGENTD_ROWS", default_value = "30")]
    pub rows: u16,

    /// Rolling output buffer size in bytes, per agent.
    #[arg(long, env = "AGENTD_RING_SIZE", default_value = "65536")]
    pub ring_size: usize,

    /// Minimum silence, in milliseconds, before the idle detector starts
    /// assigning confidence.
    #[arg(long, env = "AGENTD_IDLE_MIN_SILENCE_MS", default_value = "1500")]
    pub idle_min_silence_ms: u64,

    /// Confidence threshold at/above which `waitForIdle` resolves.
    #[arg(long, env = "AGENTD_IDLE_THRESHOLD", default_value = "0.7")]
    pub idle_threshold: f64,

    /// Per-message timeout waiting for an idle window before the attempt
    /// counter is incremented.
    #[arg(long, env = "AGENTD_INJECT_TIMEOUT_MS", default_value = "30000")]
    pub inject_timeout_ms: u64,

    /// Maximum injection attempts before a message is dropped with
    /// `injection-failed`.
    #[arg(long, env = "AGENTD_INJECT_MAX_ATTEMPTS", default_value = "5")]
    pub inject_max_attempts: u32,

    /// Delay between writing message content and the submit sequence.
    #[arg(long, env = "AGENTD_INJECT_SUBMIT_DELAY_MS", default_value = "1000")]
    pub inject_submit_delay_ms: u64,

    /// Per-recipient pending-injection queue capacity.
    #[arg(long, env = "AGENTD_QUEUE_CAPACITY", default_value = "200")]
    pub queue_capacity: usize,

    /// Size of the per-recipient delivered-id dedupe set.
    #[arg(long, env = "AGENTD_DEDUPE_CAPACITY", default_value = "1000")]
    pub dedupe_capacity: usize,

    /// Supervisor liveness-check cadence.
    #[arg(long, env = "AGENTD_SUPERVISOR_INTERVAL_MS", default_value = "2000")]
    pub supervisor_interval_ms: u64,

    /// Maximum automatic restarts within `backoff_window_secs`.
    #[arg(long, env = "AGENTD_MAX_RESTARTS", default_value = "5")]
    pub max_restarts: u32,

    /// Window, in seconds, over which `max_restarts` is counted.
    #[arg(long, env = "AGENTD_BACKOFF_WINDOW_SECS", default_value = "60")]
    pub backoff_window_secs: u64,

    /// Whether a clean (exit code 0) exit should still trigger restart
    /// context reinjection. Resolves the open question in spec.md §9:
    /// default false, i.e. clean exits are treated as intentional stops.
    #[arg(long, env = "AGENTD_RESTART_ON_CLEAN_EXIT")]
    pub restart_on_clean_exit: bool,

    /// Whether the supervisor auto-injects the latest ledger summary as a
    /// system message before the first user input after a restart.
    #[arg(long, env = "AGENTD_AUTO_INJECT_ON_RESTART", default_value = "true")]
    pub auto_inject_on_restart: bool,

    /// Marker prefix for relay commands (spec default `->relay:`).
    #[arg(long, env = "AGENTD_RELAY_PREFIX", default_value = "->relay:")]
    pub relay_prefix: String,

    /// Marker prefix for continuity commands (spec default `->continuity:`).
    #[arg(long, env = "AGENTD_CONTINUITY_PREFIX", default_value = "->continuity:")]
    pub continuity_prefix: String,

    /// Log format: `json` or `text`.
    #[arg(long, env = "AGENTD_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, env = "AGENTD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Replay a previously persisted data directory read-only, without
    /// spawning any agents, for offline inspection.
    #[arg(long, env = "AGENTD_REPLAY")]
    pub replay: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["agentd"])
    }
}

impl Config {
    /// Validate flag combinations after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.idle_threshold) {
            anyhow::bail!("--idle-threshold must be in [0.0, 1.0]");
        }
        if self.inject_max_attempts == 0 {
            anyhow::bail!("--inject-max-attempts must be at least 1");
        }
        if self.replay.is_some() && self.data_dir.is_some() {
            anyhow::bail!("--replay is a read-only reconstruction of --data-dir; specify only one");
        }
        Ok(())
    }

    /// Resolve the data directory, defaulting to
    /// `$XDG_STATE_HOME/agentd` (or `~/.local/state/agentd`).
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        let state_home = std::env::var("XDG_STATE_HOME").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_default();
            format!("{home}/.local/state")
        });
        PathBuf::from(state_home).join("agentd")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
