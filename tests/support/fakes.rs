#![allow(dead_code)]

use async_trait::async_trait;
use clusteraddr::daemon::{DaemonNode, DaemonNodeStatus, DaemonPublicIp};
use clusteraddr::host::{
    BoundAddress, InterfaceInventory, LocalInterface, MountControl, MountOutcome, ServiceControl,
};
use clusteraddr::{
    ClusterConfig, ClusterDaemonClient, ClusterError, ClusterResult, ClusterServices,
    Collaborators, DaemonError, GlusterError, Peer, PeerDirectory, VolumeInfo, VolumeManager,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Service manager keeping a set of running unit names and a call log.
#[derive(Default)]
pub struct FakeServices {
    pub running: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeServices {
    pub fn set_running(&self, name: &str, running: bool) {
        let mut set = self.running.lock();
        if running {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ServiceControl for FakeServices {
    async fn is_running(&self, service: &str) -> ClusterResult<bool> {
        Ok(self.running.lock().contains(service))
    }

    async fn start(&self, service: &str) -> ClusterResult<()> {
        self.calls.lock().push(format!("start {service}"));
        self.set_running(service, true);
        Ok(())
    }

    async fn stop(&self, service: &str) -> ClusterResult<()> {
        self.calls.lock().push(format!("stop {service}"));
        self.set_running(service, false);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDaemon {
    pub nodes: Mutex<Vec<DaemonNode>>,
    pub public_ips: Mutex<Vec<DaemonPublicIp>>,
    pub status: Mutex<Vec<DaemonNodeStatus>>,
    pub fail_status: Mutex<bool>,
}

impl FakeDaemon {
    pub fn set_status(&self, flags: &[&str]) {
        *self.status.lock() = flags
            .iter()
            .enumerate()
            .map(|(pnn, flags)| DaemonNodeStatus {
                pnn: Some(pnn as i64),
                address: None,
                flags_str: flags.to_string(),
            })
            .collect();
    }
}

#[async_trait]
impl ClusterDaemonClient for FakeDaemon {
    async fn list_nodes(&self) -> Result<Vec<DaemonNode>, DaemonError> {
        Ok(self.nodes.lock().clone())
    }

    async fn list_public_ips(&self) -> Result<Vec<DaemonPublicIp>, DaemonError> {
        Ok(self.public_ips.lock().clone())
    }

    async fn node_status(&self) -> Result<Vec<DaemonNodeStatus>, DaemonError> {
        if *self.fail_status.lock() {
            return Err(DaemonError::Failed {
                command: "status".into(),
                stderr: "connection refused".into(),
            });
        }
        Ok(self.status.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeInterfaces {
    pub interfaces: Mutex<Vec<String>>,
    pub bound: Mutex<Vec<BoundAddress>>,
}

impl FakeInterfaces {
    pub fn bind(&self, interface: &str, address: &str, dynamic: bool) {
        self.bound.lock().push(BoundAddress {
            interface: interface.to_string(),
            address: address.parse().expect("valid test address"),
            prefix_len: 24,
            dynamic,
        });
    }
}

#[async_trait]
impl InterfaceInventory for FakeInterfaces {
    async fn list_interfaces(&self) -> ClusterResult<Vec<LocalInterface>> {
        Ok(self
            .interfaces
            .lock()
            .iter()
            .map(|id| LocalInterface { id: id.clone() })
            .collect())
    }

    async fn list_bound_addresses(&self, static_only: bool) -> ClusterResult<Vec<BoundAddress>> {
        Ok(self
            .bound
            .lock()
            .iter()
            .filter(|addr| !(static_only && addr.dynamic))
            .cloned()
            .collect())
    }
}

/// Mount table with a single flag for the shared mount point.
#[derive(Default)]
pub struct FakeMounts {
    pub mounted: Mutex<bool>,
    pub probe_error: Mutex<bool>,
    pub mount_failure: Mutex<Option<String>>,
    pub unmount_failure: Mutex<Option<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeMounts {
    pub fn set_mounted(&self, mounted: bool) {
        *self.mounted.lock() = mounted;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MountControl for FakeMounts {
    fn is_mounted(&self, _path: &Path) -> std::io::Result<bool> {
        if *self.probe_error.lock() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Transport endpoint is not connected",
            ));
        }
        Ok(*self.mounted.lock())
    }

    async fn mount_glusterfs(&self, source: &str, target: &Path) -> ClusterResult<MountOutcome> {
        self.calls
            .lock()
            .push(format!("mount {source} {}", target.display()));
        if let Some(detail) = self.mount_failure.lock().clone() {
            return Ok(MountOutcome::Failed(detail));
        }
        let mut mounted = self.mounted.lock();
        if *mounted {
            return Ok(MountOutcome::AlreadyInState);
        }
        *mounted = true;
        Ok(MountOutcome::Done)
    }

    async fn unmount(&self, target: &Path) -> ClusterResult<MountOutcome> {
        self.calls
            .lock()
            .push(format!("umount {}", target.display()));
        if let Some(detail) = self.unmount_failure.lock().clone() {
            return Ok(MountOutcome::Failed(detail));
        }
        let mut mounted = self.mounted.lock();
        if !*mounted {
            return Ok(MountOutcome::AlreadyInState);
        }
        *mounted = false;
        Ok(MountOutcome::Done)
    }
}

#[derive(Default)]
pub struct FakeGluster {
    pub peers: Mutex<Vec<Peer>>,
    pub volume: Mutex<Option<VolumeInfo>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeGluster {
    pub fn set_peers(&self, peers: &[(&str, bool)]) {
        *self.peers.lock() = peers
            .iter()
            .map(|(hostname, connected)| Peer {
                hostname: hostname.to_string(),
                connected: *connected,
            })
            .collect();
    }

    pub fn set_volume(&self, volume_type: &str, status: &str, replica: u32, bricks: u32) {
        *self.volume.lock() = Some(VolumeInfo {
            name: "ctdb_shared_vol".into(),
            volume_type: volume_type.into(),
            status: status.into(),
            replica_count: replica,
            brick_count: bricks,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PeerDirectory for FakeGluster {
    async fn list_peers(&self) -> Result<Vec<Peer>, GlusterError> {
        Ok(self.peers.lock().clone())
    }
}

#[async_trait]
impl VolumeManager for FakeGluster {
    async fn volume_info(&self, _name: &str) -> Result<Option<VolumeInfo>, GlusterError> {
        Ok(self.volume.lock().clone())
    }

    async fn create_volume(
        &self,
        name: &str,
        bricks: &[String],
        replica: u32,
    ) -> Result<(), GlusterError> {
        self.calls
            .lock()
            .push(format!("create {name} replica {replica} {}", bricks.join(" ")));
        *self.volume.lock() = Some(VolumeInfo {
            name: name.to_string(),
            volume_type: "Replicate".into(),
            status: "Created".into(),
            replica_count: replica,
            brick_count: bricks.len() as u32,
        });
        Ok(())
    }

    async fn start_volume(&self, name: &str) -> Result<(), GlusterError> {
        self.calls.lock().push(format!("start {name}"));
        if let Some(info) = self.volume.lock().as_mut() {
            info.status = "Started".into();
        }
        Ok(())
    }

    async fn stop_volume(&self, name: &str, force: bool) -> Result<(), GlusterError> {
        self.calls.lock().push(format!("stop {name} force={force}"));
        if let Some(info) = self.volume.lock().as_mut() {
            info.status = "Stopped".into();
        }
        Ok(())
    }

    async fn delete_volume(&self, name: &str) -> Result<(), GlusterError> {
        self.calls.lock().push(format!("delete {name}"));
        *self.volume.lock() = None;
        Ok(())
    }
}

/// Temp directory laid out like a node, with every collaborator faked.
/// Starts healthy: filesystem service running, volume mounted, daemon
/// stopped, interfaces `eno1` and `eno2`.
pub struct Sandbox {
    pub dir: TempDir,
    pub services: Arc<FakeServices>,
    pub daemon: Arc<FakeDaemon>,
    pub interfaces: Arc<FakeInterfaces>,
    pub mounts: Arc<FakeMounts>,
    pub gluster: Arc<FakeGluster>,
    pub cluster: ClusterServices,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ClusterConfig::rooted_at(dir.path());
        std::fs::create_dir_all(&config.shared_mount).expect("shared mount dir");

        let services = Arc::new(FakeServices::default());
        services.set_running(&config.services.filesystem_daemon, true);
        let daemon = Arc::new(FakeDaemon::default());
        let interfaces = Arc::new(FakeInterfaces::default());
        *interfaces.interfaces.lock() = vec!["eno1".into(), "eno2".into()];
        let mounts = Arc::new(FakeMounts::default());
        mounts.set_mounted(true);
        let gluster = Arc::new(FakeGluster::default());

        let collaborators = Collaborators {
            services: services.clone(),
            daemon: daemon.clone(),
            interfaces: interfaces.clone(),
            mounts: mounts.clone(),
            peers: gluster.clone(),
            volumes: gluster.clone(),
        };
        let cluster = ClusterServices::new(config, collaborators);
        Self {
            dir,
            services,
            daemon,
            interfaces,
            mounts,
            gluster,
            cluster,
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.cluster.config
    }

    pub fn start_daemon(&self) {
        let name = self.config().services.cluster_daemon.clone();
        self.services.set_running(&name, true);
    }

    pub fn stop_daemon(&self) {
        let name = self.config().services.cluster_daemon.clone();
        self.services.set_running(&name, false);
    }

    pub fn private_lines(&self) -> Vec<String> {
        read_lines(&self.config().private_store)
    }

    pub fn public_lines(&self) -> Vec<String> {
        read_lines(&self.config().public_store)
    }
}

pub fn read_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => raw.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

pub fn assert_unhealthy(err: &ClusterError, needle: &str) {
    match err {
        ClusterError::Unhealthy { reasons } => assert!(
            reasons.iter().any(|reason| reason.contains(needle)),
            "expected a reason containing {needle:?}, got {reasons:?}"
        ),
        other => panic!("expected Unhealthy, got {other:?}"),
    }
}
