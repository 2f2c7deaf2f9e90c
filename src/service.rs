//! Wires the registries and volume lifecycle to their collaborators.

use crate::config::ClusterConfig;
use crate::daemon::{ClusterDaemonClient, CtdbCli};
use crate::gluster::{GlusterCli, PeerDirectory, VolumeManager};
use crate::health::HealthGate;
use crate::host::{
    CommandRunner, InterfaceInventory, IpCommandInventory, MountControl, ProcessRunner,
    ServiceControl, SystemMounts, SystemdServices,
};
use crate::lock::LockRegistry;
use crate::registry::{PrivateIpRegistry, PublicIpRegistry, RegistryContext};
use crate::timeouts::MOUNT_COMMAND_TIMEOUT;
use crate::volume::VolumeLifecycle;
use log::debug;
use std::sync::Arc;

/// External systems the crate talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub services: Arc<dyn ServiceControl>,
    pub daemon: Arc<dyn ClusterDaemonClient>,
    pub interfaces: Arc<dyn InterfaceInventory>,
    pub mounts: Arc<dyn MountControl>,
    pub peers: Arc<dyn PeerDirectory>,
    pub volumes: Arc<dyn VolumeManager>,
}

impl Collaborators {
    /// Host implementations backed by systemctl, ctdb, iproute2, gluster
    /// and mount. Mount transitions get a longer timeout than the rest.
    pub fn system(config: &ClusterConfig) -> Self {
        let process = ProcessRunner::new(config.command_timeout());
        let mount_runner: Arc<dyn CommandRunner> =
            Arc::new(process.with_timeout(MOUNT_COMMAND_TIMEOUT.max(config.command_timeout())));
        let runner: Arc<dyn CommandRunner> = Arc::new(process);
        let gluster = Arc::new(GlusterCli::new(runner.clone()));
        Self {
            services: Arc::new(SystemdServices::new(runner.clone())),
            daemon: Arc::new(CtdbCli::new(runner.clone())),
            interfaces: Arc::new(IpCommandInventory::new(runner)),
            mounts: Arc::new(SystemMounts::new(mount_runner)),
            peers: gluster.clone(),
            volumes: gluster,
        }
    }
}

/// Every component sharing one config and one lock registry.
pub struct ClusterServices {
    pub config: Arc<ClusterConfig>,
    pub private: PrivateIpRegistry,
    pub public: PublicIpRegistry,
    pub volume: VolumeLifecycle,
    context: Arc<RegistryContext>,
}

impl ClusterServices {
    pub fn new(config: ClusterConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let locks = LockRegistry::new();
        let context = Arc::new(RegistryContext::new(
            config.clone(),
            collaborators.services.clone(),
            collaborators.daemon,
            collaborators.mounts.clone(),
            collaborators.interfaces,
            locks.clone(),
        ));
        let volume = VolumeLifecycle::new(
            config.clone(),
            collaborators.services,
            collaborators.peers,
            collaborators.volumes,
            collaborators.mounts,
            &locks,
        );
        debug!(
            "event=services_ready mount={} volume={}",
            config.shared_mount.display(),
            config.volume_name
        );
        Self {
            private: PrivateIpRegistry::new(context.clone()),
            public: PublicIpRegistry::new(context.clone()),
            volume,
            config,
            context,
        }
    }

    pub fn system(config: ClusterConfig) -> Self {
        let collaborators = Collaborators::system(&config);
        Self::new(config, collaborators)
    }

    pub fn health(&self) -> &HealthGate {
        &self.context.health
    }
}
