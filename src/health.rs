//! Read-source selection and mutation gating.
//!
//! The daemon only reloads the shared files when told to, so for some window
//! after a write its live view lags the file. Reads therefore prefer the
//! daemon whenever it runs (that is what the cluster is actually serving),
//! and writes into an initialised cluster require every node to be healthy.

use crate::address::AddressClass;
use crate::config::ClusterConfig;
use crate::daemon::ClusterDaemonClient;
use crate::error::{ClusterError, ClusterResult};
use crate::host::{MountControl, ServiceControl};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthoritativeSource {
    Daemon,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationDecision {
    pub allowed: bool,
    pub reasons: Vec<String>,
}

impl MutationDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reasons: Vec::new(),
        }
    }

    fn deny(&mut self, reason: impl Into<String>) {
        self.allowed = false;
        self.reasons.push(reason.into());
    }

    pub fn into_result(self) -> ClusterResult<()> {
        if self.allowed {
            Ok(())
        } else {
            Err(ClusterError::Unhealthy {
                reasons: self.reasons,
            })
        }
    }
}

#[derive(Clone)]
pub struct HealthGate {
    config: Arc<ClusterConfig>,
    services: Arc<dyn ServiceControl>,
    daemon: Arc<dyn ClusterDaemonClient>,
    mounts: Arc<dyn MountControl>,
}

impl HealthGate {
    pub fn new(
        config: Arc<ClusterConfig>,
        services: Arc<dyn ServiceControl>,
        daemon: Arc<dyn ClusterDaemonClient>,
        mounts: Arc<dyn MountControl>,
    ) -> Self {
        Self {
            config,
            services,
            daemon,
            mounts,
        }
    }

    pub async fn daemon_running(&self) -> ClusterResult<bool> {
        self.services
            .is_running(&self.config.services.cluster_daemon)
            .await
    }

    pub async fn filesystem_running(&self) -> ClusterResult<bool> {
        self.services
            .is_running(&self.config.services.filesystem_daemon)
            .await
    }

    pub async fn authoritative_source(&self) -> ClusterResult<AuthoritativeSource> {
        Ok(if self.daemon_running().await? {
            AuthoritativeSource::Daemon
        } else {
            AuthoritativeSource::File
        })
    }

    /// A failing probe counts as unmounted; it typically means the volume
    /// is mounted but the filesystem daemon died underneath it.
    pub fn shared_volume_mounted(&self) -> bool {
        match self.mounts.is_mounted(&self.config.shared_mount) {
            Ok(mounted) => mounted,
            Err(err) => {
                warn!(
                    "event=mount_probe_failed path={} error={err}",
                    self.config.shared_mount.display()
                );
                false
            }
        }
    }

    /// Filesystem service up and shared volume mounted.
    pub async fn check_preconditions(&self) -> ClusterResult<()> {
        let mut decision = MutationDecision::allow();
        self.require_shared_volume(&mut decision).await?;
        decision.into_result()
    }

    async fn require_shared_volume(&self, decision: &mut MutationDecision) -> ClusterResult<()> {
        if !self.filesystem_running().await? {
            decision.deny(format!(
                "The \"{}\" service is not started.",
                self.config.services.filesystem_daemon
            ));
        }
        if !self.shared_volume_mounted() {
            decision.deny(format!(
                "\"{}\" is not mounted",
                self.config.shared_mount.display()
            ));
        }
        Ok(())
    }

    /// Whether a write to `class`'s store may proceed right now.
    pub async fn mutation_decision(&self, class: AddressClass) -> ClusterResult<MutationDecision> {
        let mut decision = MutationDecision::allow();
        // First address ever: no daemon state exists to check yet.
        let initialised = self.config.private_store.exists();
        if initialised && self.daemon_running().await? {
            let healthy = match self.daemon.healthy().await {
                Ok(healthy) => healthy,
                Err(err) => {
                    warn!("event=daemon_health_query_failed class={class} error={err}");
                    false
                }
            };
            if !healthy {
                decision.deny("ctdb cluster is not healthy");
            }
        }
        if class == AddressClass::Public {
            self.require_shared_volume(&mut decision).await?;
        }
        if decision.allowed {
            info!("event=mutation_gate class={class} allowed=true");
        } else {
            warn!(
                "event=mutation_gate class={class} allowed=false reasons={:?}",
                decision.reasons
            );
        }
        Ok(decision)
    }

    pub async fn mutation_allowed(&self, class: AddressClass) -> ClusterResult<bool> {
        Ok(self.mutation_decision(class).await?.allowed)
    }
}
