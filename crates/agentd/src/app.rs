// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Explicit application context (spec §9 design note: "prefer an explicit
//! application context passed to every component; the 'singleton'
//! behaviour is then just a top-level instance"). Wires the Registry,
//! Switchboard, Continuity Manager, and Agent Manager together from a
//! resolved [`Config`], in place of the teacher's process-wide `AppState`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::agent::AgentManager;
use crate::collaborators::{
    CloudPersistenceSink, NullCloudPersistenceSink, PermissiveWorkspacePolicy, ScalingPolicy,
    UnboundedScalingPolicy, WorkspacePolicySource,
};
use crate::config::Config;
use crate::continuity::{ContinuityManager, LedgerStore};
use crate::registry::Registry;
use crate::relay::Switchboard;

/// Everything one running instance of the core needs, built once at
/// startup and handed to every component instead of reached for through a
/// global.
pub struct AppContext {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub switchboard: Arc<Switchboard>,
    pub continuity: Arc<ContinuityManager>,
    pub manager: AgentManager,
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// Build the context with the default (permissive, no-op) collaborator
    /// implementations. A host binary that plugs in a real dashboard,
    /// cloud sink, or policy source should use [`AppContext::build_with`]
    /// instead.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        Self::build_with(
            config,
            Arc::new(NullCloudPersistenceSink),
            Arc::new(PermissiveWorkspacePolicy),
            Arc::new(UnboundedScalingPolicy),
        )
    }

    pub fn build_with(
        config: Config,
        cloud_sink: Arc<dyn CloudPersistenceSink>,
        workspace_policy: Arc<dyn WorkspacePolicySource>,
        scaling_policy: Arc<dyn ScalingPolicy>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let data_dir = config.resolved_data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let registry = Arc::new(Registry::load(&data_dir)?);
        let switchboard = Arc::new(Switchboard::new(config.dedupe_capacity));
        let store = LedgerStore::open(data_dir.join("ledgers"))?;
        let continuity = Arc::new(ContinuityManager::new(store));
        let config = Arc::new(config);

        let manager = AgentManager::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&switchboard),
            Arc::clone(&continuity),
            cloud_sink,
            workspace_policy,
            scaling_policy,
        );

        Ok(Self {
            config,
            registry,
            switchboard,
            continuity,
            manager,
            shutdown: CancellationToken::new(),
        })
    }
}

/// Initialize the global tracing subscriber from `config`. Uses
/// `try_init` so repeated calls (e.g. from integration tests) are
/// harmless.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let result = match config.log_format.as_str() {
        "json" => tracing_subscriber::fmt().with_env_filter(filter).json().try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Read-only inspection of a persisted data directory: lists known agents
/// and their ledger summaries without spawning any PTY (spec §9 `--replay`
/// open question, resolved as an offline reconstruction mode).
pub fn replay(data_dir: &std::path::Path) -> anyhow::Result<String> {
    let registry = Registry::load(data_dir)?;
    let store = LedgerStore::open(data_dir.join("ledgers"))?;
    let mut out = String::new();
    for (name, record) in registry.all() {
        out.push_str(&format!("{} ({}, {})\n", name, record.id, record.provider));
        if let Some(ledger) = store.find_by_agent_id(&record.id) {
            let compact = ledger.render_compact();
            if !compact.is_empty() {
                out.push_str(&compact);
            }
        }
    }
    Ok(out)
}

/// Run the core standalone: build the context, wait for a shutdown
/// signal, then stop every running agent cooperatively. Agent spawning
/// itself is delegated to an embedding program (spec §6); this entry
/// point only owns process lifetime and signal handling when run as a
/// bare daemon.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    if let Some(ref replay_dir) = config.replay {
        let summary = replay(replay_dir)?;
        print!("{summary}");
        return Ok(());
    }

    let ctx = AppContext::build(config)?;
    info!(data_dir = %ctx.config.resolved_data_dir().display(), "agentd ready");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping agents");

    let workspaces: Vec<String> =
        ctx.manager.list().into_iter().map(|a| a.workspace_id).collect();
    for workspace_id in workspaces {
        ctx.manager.stop_all_in_workspace(&workspace_id).await;
    }
    ctx.shutdown.cancel();

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(s) => Some(s),
        Err(_) => None,
    };
    let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
    {
        Ok(s) => Some(s),
        Err(_) => None,
    };

    tokio::select! {
        _ = async {
            match sigterm.as_mut() {
                Some(s) => s.recv().await,
                None => std::future::pending().await,
            }
        } => {}
        _ = async {
            match sigint.as_mut() {
                Some(s) => s.recv().await,
                None => std::future::pending().await,
            }
        } => {}
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
