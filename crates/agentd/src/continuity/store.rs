// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ledger persistence: one JSON file per agent, atomic writes, and an
//! agent-id index for O(1) resume-by-id (spec §4.6).

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{AgentError, ErrorKind};

use super::Ledger;

const LOCK_BASE_BACKOFF: Duration = Duration::from_millis(100);
const LOCK_MAX_BACKOFF: Duration = Duration::from_secs(2);
const LOCK_TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

fn sanitize(name: &str) -> anyhow::Result<String> {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        anyhow::bail!("agent name must be non-empty and free of path separators");
    }
    Ok(name.to_string())
}

fn file_name_for(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let prefix = digest.iter().take(4).map(|b| format!("{b:02x}")).collect::<String>();
    format!("{name}_{prefix}.json")
}

/// Persists `Ledger`s as one JSON file per agent under `dir`, with an
/// `_agent-id-index.json` mapping `agentId → agentName`.
pub struct LedgerStore {
    dir: PathBuf,
    index: SyncMutex<HashMap<String, String>>,
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LedgerStore {
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let index = load_index(&dir).unwrap_or_default();
        Ok(Self { dir, index: SyncMutex::new(index), locks: SyncMutex::new(HashMap::new()) })
    }

    fn lock_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(name.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    async fn acquire(&self, name: &str) -> Result<tokio::sync::OwnedMutexGuard<()>, AgentError> {
        let lock = self.lock_for(name);
        let deadline = tokio::time::Instant::now() + LOCK_TOTAL_TIMEOUT;
        let mut backoff = LOCK_BASE_BACKOFF;
        loop {
            if let Ok(guard) = lock.clone().try_lock_owned() {
                return Ok(guard);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AgentError::new(
                    "continuity-store",
                    ErrorKind::LockTimeout,
                    format!("timed out acquiring ledger lock for {name}"),
                ));
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(LOCK_MAX_BACKOFF);
        }
    }

    pub async fn create(
        &self,
        name: &str,
        cli: &str,
        session_id: &str,
        agent_id: &str,
    ) -> anyhow::Result<Ledger> {
        let name = sanitize(name)?;
        let _guard = self.acquire(&name).await?;
        let ledger = Ledger::new(name.clone(), cli, session_id, agent_id);
        self.write_locked(&name, &ledger)?;
        self.index.lock().insert(agent_id.to_string(), name);
        self.persist_index()?;
        Ok(ledger)
    }

    pub async fn save(&self, name: &str, ledger: &Ledger) -> anyhow::Result<()> {
        let _guard = self.acquire(name).await?;
        self.write_locked(name, ledger)?;
        self.index.lock().insert(ledger.agent_id.clone(), name.to_string());
        self.persist_index()?;
        Ok(())
    }

    pub fn load(&self, name: &str) -> Option<Ledger> {
        let path = self.dir.join(file_name_for(name));
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub async fn update(
        &self,
        name: &str,
        apply: impl FnOnce(&mut Ledger),
    ) -> anyhow::Result<Option<Ledger>> {
        let _guard = self.acquire(name).await?;
        let Some(mut ledger) = self.load(name) else { return Ok(None) };
        let agent_id = ledger.agent_id.clone();
        let agent_name = ledger.agent_name.clone();
        apply(&mut ledger);
        ledger.agent_id = agent_id;
        ledger.agent_name = agent_name;
        self.write_locked(name, &ledger)?;
        Ok(Some(ledger))
    }

    /// Resolve an agent id to its current ledger via the index, falling
    /// back to a full scan (and index repair) on a stale hit.
    pub fn find_by_agent_id(&self, agent_id: &str) -> Option<Ledger> {
        if let Some(name) = self.index.lock().get(agent_id).cloned() {
            if let Some(ledger) = self.load(&name) {
                if ledger.agent_id == agent_id {
                    return Some(ledger);
                }
            }
            self.index.lock().remove(agent_id);
        }

        let found = self.scan_for_agent_id(agent_id)?;
        self.index.lock().insert(agent_id.to_string(), found.agent_name.clone());
        let _ = self.persist_index();
        Some(found)
    }

    pub fn rebuild_index(&self) -> anyhow::Result<()> {
        let mut index = HashMap::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some("_agent-id-index.json") {
                continue;
            }
            if let Ok(contents) = std::fs::read_to_string(&path) {
                if let Ok(ledger) = serde_json::from_str::<Ledger>(&contents) {
                    index.insert(ledger.agent_id, ledger.agent_name);
                }
            }
        }
        *self.index.lock() = index;
        self.persist_index()
    }

    fn scan_for_agent_id(&self, agent_id: &str) -> Option<Ledger> {
        let entries = std::fs::read_dir(&self.dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()) == Some("_agent-id-index.json") {
                continue;
            }
            if let Ok(contents) = std::fs::read_to_string(&path) {
                if let Ok(ledger) = serde_json::from_str::<Ledger>(&contents) {
                    if ledger.agent_id == agent_id {
                        return Some(ledger);
                    }
                }
            }
        }
        None
    }

    /// Case-insensitive substring search across all ledgers, ranked by
    /// recency (spec §4.6 `search`).
    pub fn search(&self, query: &str, limit: usize) -> Vec<Ledger> {
        let query = query.to_lowercase();
        let mut matches: Vec<Ledger> = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.dir) else { return matches };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(&path) else { continue };
            let Ok(ledger) = serde_json::from_str::<Ledger>(&contents) else { continue };
            if contents.to_lowercase().contains(&query) {
                matches.push(ledger);
            }
        }
        matches.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        matches.truncate(limit);
        matches
    }

    fn write_locked(&self, name: &str, ledger: &Ledger) -> anyhow::Result<()> {
        let path = self.dir.join(file_name_for(name));
        let json = serde_json::to_vec_pretty(ledger)?;
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tmp_path = path.with_extension(format!("json.tmp.{ts}"));
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn persist_index(&self) -> anyhow::Result<()> {
        let path = self.dir.join("_agent-id-index.json");
        let json = serde_json::to_vec_pretty(&*self.index.lock())?;
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tmp_path = path.with_extension(format!("json.tmp.{ts}"));
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

fn load_index(dir: &Path) -> Option<HashMap<String, String>> {
    let path = dir.join("_agent-id-index.json");
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
