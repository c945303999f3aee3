// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level orchestrator (spec §4, §9): wires the PTY Wrapper, Idle
//! Detector, Injection Engine, Switchboard, Continuity Manager, Registry,
//! and Crash Insights together behind one public API, in place of the
//! teacher's process-wide singleton `AppState`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::agent::crash::{read_rss_kb, CrashInsights, CrashRecord, MemorySampler};
use crate::agent::supervisor::{RestartDecision, RestartPolicy};
use crate::collaborators::{CloudPersistenceSink, ScalingPolicy, WorkspacePolicySource};
use crate::config::Config;
use crate::continuity::ContinuityManager;
use crate::error::{AgentError, ErrorKind};
use crate::events::ManagerEvent;
use crate::idle::IdleDetector;
use crate::parser::Command;
use crate::pty::NativePty;
use crate::registry::{AgentRecord, Registry};
use crate::relay::{Envelope, Switchboard};
use crate::wrapper::{Wrapper, WrapperEvent};

/// Coarse lifecycle status surfaced to callers (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Starting,
    Running,
    Idle,
    Injecting,
    Restarting,
    Crashed,
    Stopped,
}

/// Request to spawn a new agent (spec §9 `spawn(workspaceId, cwd,
/// {name, provider, task, resumeAgentId?})`).
pub struct SpawnRequest {
    pub name: String,
    pub provider: String,
    pub task: String,
    pub resume_agent_id: Option<String>,
}

/// Public snapshot of one managed agent.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub name: String,
    pub workspace_id: String,
    pub provider: String,
    pub cwd: PathBuf,
    pub status: AgentStatus,
    pub pid: Option<u32>,
    pub spawned_at_ms: u64,
    pub restart_count: u32,
}

#[derive(Clone)]
struct AgentHandle {
    agent_id: String,
    workspace_id: String,
    provider: String,
    cwd: PathBuf,
    wrapper: Wrapper,
    injection_engine: Arc<crate::inject::InjectionEngine>,
    status: Arc<SyncRwLock<AgentStatus>>,
    spawned_at_ms: u64,
    restart_policy: Arc<SyncMutex<RestartPolicy>>,
    restart_count: Arc<AtomicU32>,
    memory: Arc<MemorySampler>,
    shutdown: CancellationToken,
}

struct ManagerInner {
    config: Arc<Config>,
    registry: Arc<Registry>,
    switchboard: Arc<Switchboard>,
    continuity: Arc<ContinuityManager>,
    cloud_sink: Arc<dyn CloudPersistenceSink>,
    workspace_policy: Arc<dyn WorkspacePolicySource>,
    scaling_policy: Arc<dyn ScalingPolicy>,
    crash_insights: SyncMutex<CrashInsights>,
    agents: SyncRwLock<HashMap<String, AgentHandle>>,
    events_tx: broadcast::Sender<ManagerEvent>,
}

/// Orchestrates every agent's PTY Wrapper, Injection Engine, and
/// continuity bookkeeping. Cheap to clone: all state lives behind `Arc`.
#[derive(Clone)]
pub struct AgentManager {
    inner: Arc<ManagerInner>,
}

impl AgentManager {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<Registry>,
        switchboard: Arc<Switchboard>,
        continuity: Arc<ContinuityManager>,
        cloud_sink: Arc<dyn CloudPersistenceSink>,
        workspace_policy: Arc<dyn WorkspacePolicySource>,
        scaling_policy: Arc<dyn ScalingPolicy>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                registry,
                switchboard,
                continuity,
                cloud_sink,
                workspace_policy,
                scaling_policy,
                crash_insights: SyncMutex::new(CrashInsights::new()),
                agents: SyncRwLock::new(HashMap::new()),
                events_tx,
            }),
        }
    }

    /// Subscribe to the manager-wide event stream (spec §4.7).
    pub fn events(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn list(&self) -> Vec<AgentInfo> {
        self.inner
            .agents
            .read()
            .iter()
            .map(|(name, handle)| Self::snapshot(name, handle))
            .collect()
    }

    fn snapshot(name: &str, handle: &AgentHandle) -> AgentInfo {
        AgentInfo {
            agent_id: handle.agent_id.clone(),
            name: name.to_string(),
            workspace_id: handle.workspace_id.clone(),
            provider: handle.provider.clone(),
            cwd: handle.cwd.clone(),
            status: *handle.status.read(),
            pid: handle.wrapper.handle().child_pid(),
            spawned_at_ms: handle.spawned_at_ms,
            restart_count: handle.restart_count.load(Ordering::Relaxed),
        }
    }

    /// Spawn a new agent. Rejects if `name` is already in use, the
    /// workspace policy denies the provider, or the scaling policy denies
    /// another agent in this workspace (spec §9).
    pub async fn spawn(
        &self,
        workspace_id: impl Into<String>,
        cwd: PathBuf,
        request: SpawnRequest,
    ) -> Result<AgentInfo, AgentError> {
        let workspace_id = workspace_id.into();

        if !self.inner.workspace_policy.may_spawn(&workspace_id, &request.provider) {
            return Err(AgentError::new(
                "agent-manager",
                ErrorKind::SpawnError,
                format!("workspace policy denied provider '{}'", request.provider),
            ));
        }

        {
            let agents = self.inner.agents.read();
            if agents.contains_key(&request.name) {
                return Err(AgentError::new(
                    "agent-manager",
                    ErrorKind::SpawnError,
                    format!("agent name '{}' already in use", request.name),
                ));
            }
            let current_count =
                agents.values().filter(|h| h.workspace_id == workspace_id).count();
            if !self.inner.scaling_policy.may_spawn_additional(&workspace_id, current_count) {
                return Err(AgentError::new(
                    "agent-manager",
                    ErrorKind::SpawnError,
                    "scaling policy denied additional agent in workspace",
                ));
            }
        }

        let agent_id =
            request.resume_agent_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let existing_ledger = match &request.resume_agent_id {
            Some(id) => self.inner.continuity.store().find_by_agent_id(id),
            None => None,
        };
        if existing_ledger.is_none() {
            let session_id = uuid::Uuid::new_v4().to_string();
            let _ = self
                .inner
                .continuity
                .store()
                .create(&request.name, &request.provider, &session_id, &agent_id)
                .await;
        }

        let handle = self
            .start_wrapper(
                &workspace_id,
                &request.name,
                &request.provider,
                cwd.clone(),
                agent_id.clone(),
                None,
            )
            .map_err(|e| AgentError::new("agent-manager", ErrorKind::SpawnError, e.to_string()))?;

        self.inner.agents.write().insert(request.name.clone(), handle.clone());

        self.inner
            .registry
            .upsert(
                request.name.clone(),
                AgentRecord::new(agent_id.clone(), request.provider.clone(), cwd.clone()),
            )
            .map_err(|e| AgentError::new("agent-manager", ErrorKind::SpawnError, e.to_string()))?;

        if !request.task.is_empty() {
            handle
                .injection_engine
                .enqueue(Envelope::new("system", request.name.as_str(), request.task.as_str()));
        }
        if let Some(ledger) = existing_ledger {
            let text = ledger.render_compact();
            if !text.is_empty() {
                handle.injection_engine.enqueue(Envelope::new("system", request.name.as_str(), text));
            }
        }

        let _ = self
            .inner
            .events_tx
            .send(ManagerEvent::Spawned { name: request.name.clone(), agent_id: agent_id.clone() });

        Ok(Self::snapshot(&request.name, &handle))
    }

    /// Cooperative stop: SIGTERM then SIGKILL after a grace period,
    /// discarding any still-pending injections.
    pub async fn stop(&self, name: &str) -> Result<(), AgentError> {
        let handle = self
            .inner
            .agents
            .write()
            .remove(name)
            .ok_or_else(|| AgentError::new("agent-manager", ErrorKind::SpawnError, "unknown agent"))?;
        handle.shutdown.cancel();
        handle.injection_engine.discard_all(&handle.wrapper).await;
        self.inner.switchboard.unsubscribe(name);
        handle.wrapper.stop(Duration::from_secs(5)).await;
        *handle.status.write() = AgentStatus::Stopped;
        let _ = self.inner.events_tx.send(ManagerEvent::Stopped { name: name.to_string() });
        Ok(())
    }

    pub async fn stop_all_in_workspace(&self, workspace_id: &str) {
        let names: Vec<String> = self
            .inner
            .agents
            .read()
            .iter()
            .filter(|(_, h)| h.workspace_id == workspace_id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in names {
            if let Err(e) = self.stop(&name).await {
                warn!(%name, error = %e, "failed to stop agent during workspace teardown");
            }
        }
    }

    /// Write raw bytes to an agent's PTY input, bypassing the Injection
    /// Engine (spec §9: direct terminal control, not a relayed message).
    pub async fn send_input(&self, name: &str, bytes: Bytes) -> Result<(), AgentError> {
        let wrapper = self.wrapper_for(name)?;
        wrapper.write(bytes).await
    }

    /// Send SIGINT-equivalent (`Ctrl-C`, `\x03`) to an agent's PTY.
    pub async fn interrupt(&self, name: &str) -> Result<(), AgentError> {
        let wrapper = self.wrapper_for(name)?;
        wrapper.write(Bytes::from_static(b"\x03")).await
    }

    /// Replay captured output from the agent's ring buffer starting at
    /// `offset`, optionally truncated to the trailing `limit` bytes.
    pub fn get_output(&self, name: &str, offset: u64, limit: Option<usize>) -> Option<Vec<u8>> {
        let handle = self.inner.agents.read().get(name)?.clone();
        let mut data = handle.wrapper.read_from(offset)?;
        if let Some(limit) = limit {
            if data.len() > limit {
                let start = data.len() - limit;
                data = data.split_off(start);
            }
        }
        Some(data)
    }

    fn wrapper_for(&self, name: &str) -> Result<Wrapper, AgentError> {
        self.inner
            .agents
            .read()
            .get(name)
            .map(|h| h.wrapper.clone())
            .ok_or_else(|| AgentError::new("agent-manager", ErrorKind::SpawnError, "unknown agent"))
    }

    /// `carry_over`, when set, threads a prior incarnation's restart
    /// history and memory samples into the new handle (a restart after a
    /// crash, not a fresh spawn) so that `RestartPolicy::decide` keeps
    /// accumulating attempts across the sliding backoff window instead of
    /// starting over each time.
    fn start_wrapper(
        &self,
        workspace_id: &str,
        name: &str,
        provider: &str,
        cwd: PathBuf,
        agent_id: String,
        carry_over: Option<(Arc<SyncMutex<RestartPolicy>>, Arc<AtomicU32>, Arc<MemorySampler>)>,
    ) -> anyhow::Result<AgentHandle> {
        let config = &self.inner.config;
        let command = vec![provider.to_string()];
        let pty = NativePty::spawn(&command, Some(&cwd), &[], config.cols, config.rows)?;

        let idle = IdleDetector::new(Duration::from_millis(config.idle_min_silence_ms), config.idle_threshold);
        let (wrapper, event_rx) = Wrapper::start(
            name,
            Box::new(pty),
            config.ring_size,
            idle.clone(),
            config.relay_prefix.clone(),
            config.continuity_prefix.clone(),
        );

        let injection_engine = Arc::new(crate::inject::InjectionEngine::new(
            config.queue_capacity,
            Duration::from_millis(config.inject_timeout_ms),
            config.inject_max_attempts,
            Duration::from_millis(config.inject_submit_delay_ms),
        ));

        let (inbound_tx, mut inbound_rx) = tokio::sync::mpsc::unbounded_channel::<Envelope>();
        self.inner.switchboard.subscribe(name, inbound_tx);
        {
            let injection_engine = injection_engine.clone();
            tokio::spawn(async move {
                while let Some(envelope) = inbound_rx.recv().await {
                    injection_engine.enqueue(envelope);
                }
            });
        }

        let shutdown = CancellationToken::new();
        {
            let injection_engine = injection_engine.clone();
            let wrapper = wrapper.clone();
            let idle = idle.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                injection_engine.run(wrapper, idle, shutdown).await;
            });
        }

        let (restart_policy, restart_count, memory) = match carry_over {
            Some((restart_policy, restart_count, memory)) => (restart_policy, restart_count, memory),
            None => (
                Arc::new(SyncMutex::new(RestartPolicy::new(
                    config.max_restarts,
                    Duration::from_secs(config.backoff_window_secs),
                ))),
                Arc::new(AtomicU32::new(0)),
                Arc::new(MemorySampler::new()),
            ),
        };

        if let Some(pid) = wrapper.handle().child_pid() {
            let memory = memory.clone();
            let interval = Duration::from_millis(config.supervisor_interval_ms);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            if let Some(rss_kb) = read_rss_kb(pid) {
                                memory.record(rss_kb);
                            }
                        }
                        _ = shutdown.cancelled() => return,
                    }
                }
            });
        }

        let handle = AgentHandle {
            agent_id,
            workspace_id: workspace_id.to_string(),
            provider: provider.to_string(),
            cwd,
            wrapper: wrapper.clone(),
            injection_engine,
            status: Arc::new(SyncRwLock::new(AgentStatus::Starting)),
            spawned_at_ms: now_ms(),
            restart_policy,
            restart_count,
            memory,
            shutdown,
        };

        {
            let manager = self.clone();
            let name = name.to_string();
            let mut event_rx = event_rx;
            tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    manager.handle_wrapper_event(&name, event).await;
                }
            });
        }

        *handle.status.write() = AgentStatus::Running;
        Ok(handle)
    }

    async fn handle_wrapper_event(&self, name: &str, event: WrapperEvent) {
        match event {
            WrapperEvent::Output(_) => {}
            WrapperEvent::Summary(body) => {
                self.inner.continuity.merge_summary(name, &body).await;
                let agent_id = self.agent_id_for(name);
                let _ = self
                    .inner
                    .events_tx
                    .send(ManagerEvent::Summary { name: name.to_string(), body: body.clone() });
                if let Some(agent_id) = agent_id {
                    if let Err(e) = self.inner.cloud_sink.on_summary(&agent_id, &body).await {
                        warn!(%name, error = %e, "cloud persistence sink rejected summary");
                    }
                }
            }
            WrapperEvent::SessionEnd(body) => {
                let agent_id = self.agent_id_for(name);
                let _ = self
                    .inner
                    .events_tx
                    .send(ManagerEvent::SessionEnd { name: name.to_string(), body: body.clone() });
                if let Some(agent_id) = agent_id {
                    if let Err(e) = self.inner.cloud_sink.on_session_end(&agent_id, &body).await {
                        warn!(%name, error = %e, "cloud persistence sink rejected session-end");
                    }
                }
            }
            WrapperEvent::InjectionFailed { message_id, attempts } => {
                let _ = self.inner.events_tx.send(ManagerEvent::InjectionFailed {
                    name: name.to_string(),
                    message_id,
                    attempts,
                });
            }
            WrapperEvent::Command(command) => self.handle_command(name, command).await,
            WrapperEvent::Exit(status) => self.handle_exit(name, status).await,
        }
    }

    async fn handle_command(&self, name: &str, command: Command) {
        if let Some(result) = self.inner.continuity.dispatch(name, &command).await {
            if let Some(text) = result.reinject {
                if let Some(engine) = self.injection_engine_for(name) {
                    engine.enqueue(Envelope::new("system", name, text));
                }
            }
            return;
        }

        match command {
            Command::Relay { to, body } => {
                self.inner.switchboard.publish(Envelope::new(name, to, body));
            }
            Command::Spawn { name: child_name, cli, task } => {
                let Some(workspace_id) = self.inner.agents.read().get(name).map(|h| h.workspace_id.clone())
                else {
                    return;
                };
                let Some(cwd) = self.inner.agents.read().get(name).map(|h| h.cwd.clone()) else {
                    return;
                };
                let manager = self.clone();
                tokio::spawn(async move {
                    let request = SpawnRequest {
                        name: child_name,
                        provider: cli,
                        task,
                        resume_agent_id: None,
                    };
                    if let Err(e) = manager.spawn(workspace_id, cwd, request).await {
                        error!(error = %e, "agent-requested spawn failed");
                    }
                });
            }
            Command::Release { name: target } => {
                let manager = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = manager.stop(&target).await {
                        warn!(%target, error = %e, "agent-requested release failed");
                    }
                });
            }
            Command::ChannelJoin { channel } => {
                self.inner.switchboard.join_channel(&channel, name);
            }
            Command::ChannelLeave { channel } => {
                self.inner.switchboard.leave_channel(&channel, name);
            }
            _ => {}
        }
    }

    async fn handle_exit(&self, name: &str, status: crate::pty::ExitStatus) {
        let Some(handle) = self.inner.agents.read().get(name).cloned() else { return };

        handle.injection_engine.discard_all(&handle.wrapper).await;
        self.inner.switchboard.unsubscribe(name);

        let output_tail = handle
            .wrapper
            .read_from(0)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        let tail_start = output_tail.len().saturating_sub(2000);
        let record = CrashRecord::new(
            name,
            handle.wrapper.handle().child_pid(),
            status.code,
            status.signal,
            handle.memory.snapshot(),
            &output_tail[tail_start..],
        );
        self.inner.crash_insights.lock().record(record.clone());

        let config = &self.inner.config;
        let treat_as_intentional = status.is_clean() && !config.restart_on_clean_exit;

        if treat_as_intentional {
            self.inner.agents.write().remove(name);
            *handle.status.write() = AgentStatus::Stopped;
            let _ = self.inner.events_tx.send(ManagerEvent::Stopped { name: name.to_string() });
            return;
        }

        *handle.status.write() = AgentStatus::Crashed;
        let _ = self
            .inner
            .events_tx
            .send(ManagerEvent::Crashed { name: name.to_string(), record: Box::new(record) });

        let decision = handle.restart_policy.lock().decide(now_ms());
        match decision {
            RestartDecision::PermanentlyDead => {
                warn!(%name, "agent exceeded max restarts within the backoff window, giving up");
                self.inner.agents.write().remove(name);
                *handle.status.write() = AgentStatus::Stopped;
                let _ = self.inner.events_tx.send(ManagerEvent::Stopped { name: name.to_string() });
            }
            RestartDecision::Restart(backoff) => {
                *handle.status.write() = AgentStatus::Restarting;
                let manager = self.clone();
                let name = name.to_string();
                let workspace_id = handle.workspace_id.clone();
                let provider = handle.provider.clone();
                let cwd = handle.cwd.clone();
                let agent_id = handle.agent_id.clone();
                let attempt = handle.restart_count.fetch_add(1, Ordering::Relaxed) + 1;
                let auto_inject = config.auto_inject_on_restart;
                let carry_over = Some((
                    handle.restart_policy.clone(),
                    handle.restart_count.clone(),
                    handle.memory.clone(),
                ));
                tokio::spawn(async move {
                    tokio::time::sleep(backoff).await;
                    manager.inner.agents.write().remove(&name);
                    match manager.start_wrapper(
                        &workspace_id,
                        &name,
                        &provider,
                        cwd,
                        agent_id.clone(),
                        carry_over,
                    ) {
                        Ok(new_handle) => {
                            if auto_inject {
                                if let Some(ledger) = manager.inner.continuity.store().find_by_agent_id(&agent_id) {
                                    let text = ledger.render_compact();
                                    if !text.is_empty() {
                                        new_handle
                                            .injection_engine
                                            .enqueue(Envelope::new("system", name.as_str(), text));
                                    }
                                }
                            }
                            manager.inner.agents.write().insert(name.clone(), new_handle);
                            let _ = manager
                                .inner
                                .events_tx
                                .send(ManagerEvent::Restarted { name: name.clone(), attempt });
                        }
                        Err(e) => {
                            error!(%name, error = %e, "restart respawn failed");
                        }
                    }
                });
            }
        }
    }

    fn agent_id_for(&self, name: &str) -> Option<String> {
        self.inner.agents.read().get(name).map(|h| h.agent_id.clone())
    }

    fn injection_engine_for(&self, name: &str) -> Option<Arc<crate::inject::InjectionEngine>> {
        self.inner.agents.read().get(name).map(|h| h.injection_engine.clone())
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
