//! Private and public address registries.
//!
//! Both registries validate against the combined address space, so each
//! holds a handle to the shared [`RegistryContext`] rather than to the other
//! registry. Uniqueness is re-read under the class lock right before the
//! write, but the two classes use different locks: a private and a public
//! create racing on the same address can both pass validation. The store
//! files are also rewritten without coordinating with the daemon. Neither
//! gap is closed here.

pub mod private;
pub mod public;

pub use private::PrivateIpRegistry;
pub use public::PublicIpRegistry;

use crate::address::{AddressClass, AddressFilter, PublicIpRecord};
use crate::config::ClusterConfig;
use crate::daemon::ClusterDaemonClient;
use crate::error::{ClusterError, ClusterResult};
use crate::health::{AuthoritativeSource, HealthGate};
use crate::host::{InterfaceInventory, MountControl, ServiceControl};
use crate::lock::{LockRegistry, MutationLock};
use crate::persistence::{active_private, public_records, SharedStore, SymlinkGuard};
use log::warn;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Everything a registry needs, resolved once and shared.
pub struct RegistryContext {
    pub config: Arc<ClusterConfig>,
    pub health: HealthGate,
    pub daemon: Arc<dyn ClusterDaemonClient>,
    pub interfaces: Arc<dyn InterfaceInventory>,
    pub locks: LockRegistry,
    pub private_store: SharedStore,
    pub public_store: SharedStore,
}

impl RegistryContext {
    pub fn new(
        config: Arc<ClusterConfig>,
        services: Arc<dyn ServiceControl>,
        daemon: Arc<dyn ClusterDaemonClient>,
        mounts: Arc<dyn MountControl>,
        interfaces: Arc<dyn InterfaceInventory>,
        locks: LockRegistry,
    ) -> Self {
        let health = HealthGate::new(config.clone(), services, daemon.clone(), mounts);
        Self {
            private_store: SharedStore::new(config.private_store.clone()),
            public_store: SharedStore::new(config.public_store.clone()),
            config,
            health,
            daemon,
            interfaces,
            locks,
        }
    }

    pub fn lock_for(&self, class: AddressClass) -> MutationLock {
        self.locks.named(class.lock_name())
    }

    /// Private addresses from the authoritative source, in source order.
    pub async fn private_addresses(&self) -> ClusterResult<Vec<IpAddr>> {
        match self.health.authoritative_source().await? {
            AuthoritativeSource::Daemon => {
                let nodes = self.daemon.list_nodes().await?;
                Ok(nodes
                    .into_iter()
                    .filter_map(|node| match node.address.parse() {
                        Ok(ip) => Some(ip),
                        Err(_) => {
                            warn!("event=daemon_node_unparsed address={:?}", node.address);
                            None
                        }
                    })
                    .collect())
            }
            AuthoritativeSource::File => {
                let Some(lines) = self
                    .read_linked(&self.private_store, &self.config.private_link)
                    .await?
                else {
                    return Ok(Vec::new());
                };
                Ok(active_private(&lines))
            }
        }
    }

    /// Public addresses from the authoritative source, filtered.
    pub async fn public_addresses(
        &self,
        filter: &AddressFilter,
    ) -> ClusterResult<Vec<PublicIpRecord>> {
        let records = match self.health.authoritative_source().await? {
            AuthoritativeSource::Daemon => self
                .daemon
                .list_public_ips()
                .await?
                .into_iter()
                .filter_map(|ip| match ip.public_ip.parse() {
                    Ok(addr) => Some(PublicIpRecord {
                        ip: addr,
                        netmask: ip.netmask,
                        interfaces: ip.interfaces,
                        node: ip.pnn,
                    }),
                    Err(_) => {
                        warn!("event=daemon_public_ip_unparsed address={:?}", ip.public_ip);
                        None
                    }
                })
                .collect(),
            AuthoritativeSource::File => {
                match self
                    .read_linked(&self.public_store, &self.config.public_link)
                    .await?
                {
                    Some(lines) => public_records(&lines),
                    None => Vec::new(),
                }
            }
        };
        Ok(records
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    /// Private ∪ public, recomputed on every call.
    pub async fn combined_addresses(&self) -> ClusterResult<Vec<IpAddr>> {
        let mut combined = self.private_addresses().await?;
        combined.extend(
            self.public_addresses(&AddressFilter::default())
                .await?
                .into_iter()
                .map(|record| record.ip),
        );
        Ok(combined)
    }

    /// Reads a store only when the volume is mounted, the file exists and
    /// the local link points at it; anything else reads as `None`.
    async fn read_linked(
        &self,
        store: &SharedStore,
        link: &Path,
    ) -> ClusterResult<Option<Vec<String>>> {
        if !self.health.shared_volume_mounted() {
            return Ok(None);
        }
        if !store.exists() {
            return Ok(None);
        }
        if !SymlinkGuard::is_linked(link, store.path()) {
            warn!(
                "event=store_link_invalid local={} canonical={}",
                link.display(),
                store.path().display()
            );
            return Ok(None);
        }
        let store = store.clone();
        let lines = run_blocking(move || store.read().map_err(ClusterError::from)).await?;
        Ok(Some(lines))
    }

    /// Link repair, then the health gate, then creation of a missing store
    /// file. Shared by create and delete. The file is only created once the
    /// gate has passed, since its absence is what admits the first write.
    pub(crate) async fn prepare_write(
        &self,
        class: AddressClass,
        store: &SharedStore,
        link: &Path,
    ) -> ClusterResult<()> {
        let local = link.to_path_buf();
        let canonical = store.path().to_path_buf();
        run_blocking(move || {
            SymlinkGuard::ensure_linked(&local, &canonical)
                .map(|_| ())
                .map_err(ClusterError::from)
        })
        .await?;
        self.health.mutation_decision(class).await?.into_result()?;
        let store = store.clone();
        run_blocking(move || store.touch().map_err(ClusterError::from)).await
    }
}

/// Runs filesystem work off the async worker threads.
pub(crate) async fn run_blocking<T, F>(work: F) -> ClusterResult<T>
where
    F: FnOnce() -> ClusterResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ClusterError::Unavailable {
            detail: format!("blocking task failed: {err}"),
        })?
}
