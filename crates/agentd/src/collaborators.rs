// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External interfaces the core consumes but does not implement (spec §6
//! "Delegated collaborators"). These are explicitly out of scope for this
//! crate: an HTTP dashboard, a cloud persistence sink, an OAuth/workspace
//! policy source, and a scaling policy. The core only needs trait-shaped
//! seams so a host binary can wire real implementations in without this
//! crate depending on HTTP, cloud SDKs, or billing concerns.

use async_trait::async_trait;

use crate::events::ManagerEvent;

/// What the core needs from an HTTP/WebSocket dashboard: none, directly —
/// the dashboard calls back into the public [`crate::agent::manager::AgentManager`]
/// API and subscribes to its event stream. This trait exists only to name
/// the seam so a host binary's dashboard adapter has a documented contract
/// to implement, without pulling `axum`/`tower` into this crate.
pub trait DashboardApi: Send + Sync {
    fn on_event(&self, event: &ManagerEvent);
}

/// Optional sink for `summary` and `session-end` events (spec §6). The
/// core invokes this and tolerates errors — logs only, never blocks or
/// retries.
#[async_trait]
pub trait CloudPersistenceSink: Send + Sync {
    async fn on_summary(&self, agent_id: &str, body: &str) -> anyhow::Result<()>;
    async fn on_session_end(&self, agent_id: &str, body: &str) -> anyhow::Result<()>;
}

/// No-op sink used when no cloud collaborator is configured.
pub struct NullCloudPersistenceSink;

#[async_trait]
impl CloudPersistenceSink for NullCloudPersistenceSink {
    async fn on_summary(&self, _agent_id: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_session_end(&self, _agent_id: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Source of workspace-scoped policy the core consults but never owns
/// (e.g. an external OAuth/workspace-membership service). The core treats
/// a denial as "do not spawn", never as a crash.
pub trait WorkspacePolicySource: Send + Sync {
    fn may_spawn(&self, workspace_id: &str, provider: &str) -> bool;
}

/// Allows every spawn; the default when no external policy source is
/// configured.
pub struct PermissiveWorkspacePolicy;

impl WorkspacePolicySource for PermissiveWorkspacePolicy {
    fn may_spawn(&self, _workspace_id: &str, _provider: &str) -> bool {
        true
    }
}

/// Scaling policy consulted before spawning another agent in a workspace
/// (e.g. a container-quota service). Container spawning itself is out of
/// scope; this trait only names the decision point.
pub trait ScalingPolicy: Send + Sync {
    fn may_spawn_additional(&self, workspace_id: &str, current_count: usize) -> bool;
}

/// Unbounded scaling; the default when no external scaling policy is
/// configured.
pub struct UnboundedScalingPolicy;

impl ScalingPolicy for UnboundedScalingPolicy {
    fn may_spawn_additional(&self, _workspace_id: &str, _current_count: usize) -> bool {
        true
    }
}
