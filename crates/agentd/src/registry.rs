// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide agent registry (spec §3, §4.4 "Registry maintenance").
//! Persisted as `agents.json` via atomic file replace; rebuilt on start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::relay::switchboard::RegistryHook;

/// A registry entry for one known agent name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub provider: String,
    pub working_dir: PathBuf,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub profile: Option<serde_json::Value>,
    /// Free-form labels so external policy sources can select subsets of
    /// agents without re-deriving them from `provider`/`working_dir`.
    pub tags: Vec<String>,
}

impl AgentRecord {
    pub fn new(id: impl Into<String>, provider: impl Into<String>, working_dir: PathBuf) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            provider: provider.into(),
            working_dir,
            first_seen_ms: now,
            last_seen_ms: now,
            messages_sent: 0,
            messages_received: 0,
            profile: None,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    agents: HashMap<String, AgentRecord>,
}

/// Process-wide mapping from agent `name` to `AgentRecord`, guarded by a
/// mutex and persisted through atomic file replace (spec §5: "Registry:
/// process-wide map behind a mutex; atomic persistence").
pub struct Registry {
    path: PathBuf,
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl Registry {
    /// Load `agents.json` from `data_dir` if present, else start empty.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join("agents.json");
        let agents = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let file: RegistryFile = serde_json::from_str(&contents)?;
            file.agents
        } else {
            HashMap::new()
        };
        Ok(Self { path, agents: RwLock::new(agents) })
    }

    pub fn upsert(&self, name: impl Into<String>, record: AgentRecord) -> anyhow::Result<()> {
        self.agents.write().insert(name.into(), record);
        self.persist()
    }

    pub fn get(&self, name: &str) -> Option<AgentRecord> {
        self.agents.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.agents.write().remove(name);
        self.persist()
    }

    pub fn touch_last_seen(&self, name: &str) -> anyhow::Result<()> {
        let mut agents = self.agents.write();
        if let Some(record) = agents.get_mut(name) {
            record.last_seen_ms = now_ms();
        }
        drop(agents);
        self.persist()
    }

    pub fn all(&self) -> Vec<(String, AgentRecord)> {
        self.agents.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn persist(&self) -> anyhow::Result<()> {
        let file = RegistryFile { agents: self.agents.read().clone() };
        let json = serde_json::to_vec_pretty(&file)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

impl RegistryHook for Registry {
    fn record_sent(&self, agent_name: &str) {
        let mut agents = self.agents.write();
        if let Some(record) = agents.get_mut(agent_name) {
            record.messages_sent += 1;
            record.last_seen_ms = now_ms();
        }
        drop(agents);
        let _ = self.persist();
    }

    fn record_received(&self, agent_name: &str) {
        let mut agents = self.agents.write();
        if let Some(record) = agents.get_mut(agent_name) {
            record.messages_received += 1;
            record.last_seen_ms = now_ms();
        }
        drop(agents);
        let _ = self.persist();
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
