// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified error taxonomy shared across the supervision, relay, and
//! continuity subsystems (spec §7).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Kinds of errors the core can raise, independent of any particular
/// subsystem's concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    SpawnError,
    InjectionTimeout,
    PtyWriteError,
    LockTimeout,
    ParseRejection,
    RelayOverflow,
    CrashDetected,
    AuthRevocation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpawnError => "SPAWN_ERROR",
            Self::InjectionTimeout => "INJECTION_TIMEOUT",
            Self::PtyWriteError => "PTY_WRITE_ERROR",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::ParseRejection => "PARSE_REJECTION",
            Self::RelayOverflow => "RELAY_OVERFLOW",
            Self::CrashDetected => "CRASH_DETECTED",
            Self::AuthRevocation => "AUTH_REVOCATION",
        }
    }

    /// Whether this kind is an informational event rather than a failure
    /// (spec §7: `CrashDetected` is "normal (not-errorful)").
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::CrashDetected)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error event, as required by spec §7: every error event
/// carries `{timestamp, component, agentId?, kind, message, context}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentError {
    pub timestamp_ms: u64,
    pub component: String,
    pub agent_id: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
    pub context: serde_json::Value,
}

impl AgentError {
    pub fn new(component: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            timestamp_ms,
            component: component.into(),
            agent_id: None,
            kind,
            message: message.into(),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.component, self.message)
    }
}

impl std::error::Error for AgentError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
