//! Orchestration of the replicated volume that backs the shared stores.

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::gluster::{PeerDirectory, VolumeInfo, VolumeManager, REPLICATE_TYPE};
use crate::host::{MountControl, MountOutcome, ServiceControl};
use crate::lock::{LockRegistry, MutationLock};
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;

pub const MOUNT_LOCK: &str = "ctdb_mount_umount_lock";
pub const LIFECYCLE_LOCK: &str = "ctdb_create_or_delete_lock";
/// Fewer replicas than this can split-brain.
pub const MIN_REPLICAS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeStatus {
    pub exists: bool,
    pub started: bool,
    pub mounted: bool,
}

pub struct VolumeLifecycle {
    config: Arc<ClusterConfig>,
    services: Arc<dyn ServiceControl>,
    peers: Arc<dyn PeerDirectory>,
    volumes: Arc<dyn VolumeManager>,
    mounts: Arc<dyn MountControl>,
    mount_lock: MutationLock,
    lifecycle_lock: MutationLock,
}

impl VolumeLifecycle {
    pub fn new(
        config: Arc<ClusterConfig>,
        services: Arc<dyn ServiceControl>,
        peers: Arc<dyn PeerDirectory>,
        volumes: Arc<dyn VolumeManager>,
        mounts: Arc<dyn MountControl>,
        locks: &LockRegistry,
    ) -> Self {
        Self {
            config,
            services,
            peers,
            volumes,
            mounts,
            mount_lock: locks.named(MOUNT_LOCK),
            lifecycle_lock: locks.named(LIFECYCLE_LOCK),
        }
    }

    /// Inspects the volume, starting it when it exists but is stopped.
    /// A volume whose layout could split-brain is refused outright.
    pub async fn status(&self) -> ClusterResult<VolumeStatus> {
        let name = &self.config.volume_name;
        let Some(info) = self.volumes.volume_info(name).await? else {
            return Ok(VolumeStatus {
                exists: false,
                started: false,
                mounted: self.mounted(),
            });
        };
        check_layout(&info)?;
        if !info.is_started() {
            info!("event=volume_starting volume={name} status={}", info.status);
            self.volumes.start_volume(name).await?;
        }
        Ok(VolumeStatus {
            exists: true,
            started: true,
            mounted: self.mounted(),
        })
    }

    /// Creates the volume across every connected peer if missing, then
    /// starts and mounts it.
    pub async fn create(&self) -> ClusterResult<VolumeStatus> {
        let _guard = self.lifecycle_lock.acquire().await;
        let name = &self.config.volume_name;
        let status = self.status().await?;

        if !status.exists {
            let peers = self.peers.list_peers().await?;
            if peers.is_empty() {
                return Err(ClusterError::unhealthy("No peers detected"));
            }
            let connected: Vec<&str> = peers
                .iter()
                .filter(|peer| peer.connected)
                .map(|peer| peer.hostname.as_str())
                .collect();
            let replica = connected.len() as u32;
            if replica < MIN_REPLICAS {
                return Err(ClusterError::unhealthy(format!(
                    "{MIN_REPLICAS} peers must be present and connected before the shared volume can be created, found {replica}"
                )));
            }
            let brick_path = self.config.brick_path();
            let bricks: Vec<String> = connected
                .iter()
                .map(|host| format!("{host}:{}", brick_path.display()))
                .collect();
            self.volumes.create_volume(name, &bricks, replica).await?;
            self.volumes.start_volume(name).await?;
        }

        let mounted = self.mount().await?;
        if !mounted {
            warn!("event=volume_mount_skipped volume={name}");
        }
        Ok(VolumeStatus {
            exists: true,
            started: true,
            mounted,
        })
    }

    /// Unmounts, stops and deletes the volume. Absent volumes are a no-op
    /// reported as `false`.
    pub async fn delete(&self) -> ClusterResult<bool> {
        let _guard = self.lifecycle_lock.acquire().await;
        let name = &self.config.volume_name;
        let status = self.status().await?;
        if !status.exists {
            info!("event=volume_delete_skipped volume={name} reason=absent");
            return Ok(false);
        }
        if !self.unmount().await? {
            return Err(ClusterError::Unavailable {
                detail: format!(
                    "failed to unmount {}; refusing to delete volume {name}",
                    self.config.shared_mount.display()
                ),
            });
        }
        if status.started {
            self.volumes.stop_volume(name, true).await?;
        }
        self.volumes.delete_volume(name).await?;
        info!("event=volume_removed volume={name}");
        Ok(true)
    }

    /// Mounts the volume locally. Returns `false` when the filesystem
    /// service is down, the volume is not ready or the mount failed.
    pub async fn mount(&self) -> ClusterResult<bool> {
        let _guard = self.mount_lock.acquire().await;
        let filesystem = &self.config.services.filesystem_daemon;
        if !self.services.is_running(filesystem).await? {
            warn!("event=mount_skipped reason=service_stopped service={filesystem}");
            return Ok(false);
        }
        let status = self.status().await?;
        if !status.exists || !status.started {
            return Ok(false);
        }

        let target = self.config.shared_mount.clone();
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|source| ClusterError::Io {
                path: target.clone(),
                source,
            })?;

        let source = format!("localhost:/{}", self.config.volume_name);
        let outcome = self
            .with_events_suppressed(self.mounts.mount_glusterfs(&source, &target))
            .await;
        Ok(self.settle("mount", outcome))
    }

    /// Unmounts the volume. An already absent mount counts as success.
    pub async fn unmount(&self) -> ClusterResult<bool> {
        let _guard = self.mount_lock.acquire().await;
        let target = self.config.shared_mount.clone();
        let outcome = self
            .with_events_suppressed(self.mounts.unmount(&target))
            .await;
        Ok(self.settle("unmount", outcome))
    }

    /// Mount transitions emit filesystem events whose handlers would
    /// remount or unmount again, so the notifier is stopped around them
    /// and restarted whatever the outcome.
    async fn with_events_suppressed<F>(&self, transition: F) -> ClusterResult<MountOutcome>
    where
        F: std::future::Future<Output = ClusterResult<MountOutcome>>,
    {
        let notifier = &self.config.services.event_notifier;
        if let Err(err) = self.services.stop(notifier).await {
            warn!("event=event_notifier_stop_failed service={notifier} error={err}");
        }
        let outcome = transition.await;
        if let Err(err) = self.services.start(notifier).await {
            warn!("event=event_notifier_start_failed service={notifier} error={err}");
        }
        outcome
    }

    fn settle(&self, op: &str, outcome: ClusterResult<MountOutcome>) -> bool {
        let path = self.config.shared_mount.display();
        match outcome {
            Ok(MountOutcome::Done) => {
                info!("event=volume_{op} path={path}");
                true
            }
            Ok(MountOutcome::AlreadyInState) => {
                info!("event=volume_{op} path={path} already=true");
                true
            }
            Ok(MountOutcome::Failed(detail)) => {
                error!("event=volume_{op}_failed path={path} error={detail:?}");
                false
            }
            Err(err) => {
                error!("event=volume_{op}_failed path={path} error={err}");
                false
            }
        }
    }

    fn mounted(&self) -> bool {
        self.mounts
            .is_mounted(&self.config.shared_mount)
            .unwrap_or(false)
    }
}

fn check_layout(info: &VolumeInfo) -> ClusterResult<()> {
    if info.volume_type != REPLICATE_TYPE {
        return Err(ClusterError::ConfigurationConflict {
            volume: info.name.clone(),
            detail: format!(
                "type is {}, not {REPLICATE_TYPE}; delete or rename it and try again",
                info.volume_type
            ),
        });
    }
    if info.replica_count < MIN_REPLICAS || info.brick_count < MIN_REPLICAS {
        return Err(ClusterError::ConfigurationConflict {
            volume: info.name.clone(),
            detail: format!(
                "replica {} with {} bricks could split-brain; delete or rename it and try again",
                info.replica_count, info.brick_count
            ),
        });
    }
    Ok(())
}
