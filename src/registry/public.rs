use super::{run_blocking, RegistryContext};
use crate::address::{AddressClass, AddressFilter, PublicAddress, PublicIpRecord};
use crate::error::{ClusterError, ClusterResult};
use crate::lock::MutationLock;
use crate::persistence::PublicLine;
use log::info;
use std::net::IpAddr;
use std::sync::Arc;

/// Floating addresses in the public store. Deletion drops the line.
#[derive(Clone)]
pub struct PublicIpRegistry {
    ctx: Arc<RegistryContext>,
    lock: MutationLock,
}

impl PublicIpRegistry {
    pub fn new(ctx: Arc<RegistryContext>) -> Self {
        let lock = ctx.lock_for(AddressClass::Public);
        Self { ctx, lock }
    }

    pub async fn list(&self, filter: &AddressFilter) -> ClusterResult<Vec<PublicIpRecord>> {
        self.ctx.public_addresses(filter).await
    }

    pub async fn get(&self, ip: IpAddr) -> ClusterResult<PublicIpRecord> {
        let filter = AddressFilter {
            ip: Some(ip),
            interface: None,
        };
        self.list(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClusterError::not_found(format!("public address {ip}")))
    }

    pub async fn create(&self, candidate: PublicAddress) -> ClusterResult<PublicIpRecord> {
        let _guard = self.lock.acquire().await;
        self.ctx.health.check_preconditions().await?;

        let combined = self.ctx.combined_addresses().await?;
        if combined.contains(&candidate.ip) {
            return Err(ClusterError::Conflict {
                ip: candidate.ip.to_string(),
            });
        }
        self.validate_against_host(&candidate).await?;

        let store = self.ctx.public_store.clone();
        self.ctx
            .prepare_write(AddressClass::Public, &store, &self.ctx.config.public_link)
            .await?;

        let line = PublicLine {
            ip: candidate.ip,
            netmask: candidate.netmask,
            interface: candidate.interface.clone(),
        }
        .render();
        run_blocking(move || store.append(&line).map_err(ClusterError::from)).await?;
        info!(
            "event=public_ip_created ip={} netmask={} interface={} path={}",
            candidate.ip,
            candidate.netmask,
            candidate.interface,
            self.ctx.public_store.path().display()
        );
        Ok(PublicIpRecord::from(&candidate))
    }

    /// Host-dependent checks: the address must not already be a static
    /// address of this node and the interface must exist here.
    async fn validate_against_host(&self, candidate: &PublicAddress) -> ClusterResult<()> {
        let bound = self.ctx.interfaces.list_bound_addresses(true).await?;
        if bound.iter().any(|addr| addr.address == candidate.ip) {
            return Err(ClusterError::Conflict {
                ip: candidate.ip.to_string(),
            });
        }
        candidate.validate_format()?;
        let interfaces = self.ctx.interfaces.list_interfaces().await?;
        if !interfaces.iter().any(|iface| iface.id == candidate.interface) {
            return Err(ClusterError::not_found(format!(
                "interface \"{}\"",
                candidate.interface
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, ip: IpAddr) -> ClusterResult<IpAddr> {
        let _guard = self.lock.acquire().await;
        self.ctx.health.check_preconditions().await?;

        let combined = self.ctx.combined_addresses().await?;
        if !combined.contains(&ip) {
            return Err(ClusterError::not_found(format!("public address {ip}")));
        }

        let store = self.ctx.public_store.clone();
        self.ctx
            .prepare_write(AddressClass::Public, &store, &self.ctx.config.public_link)
            .await?;

        let describe = ip.to_string();
        let removed = run_blocking(move || {
            store
                .rewrite_removing(&describe, |line| PublicLine::matches_ip(line, &ip))
                .map_err(ClusterError::from)
        })
        .await?;
        info!(
            "event=public_ip_deleted ip={ip} line={removed:?} path={}",
            self.ctx.public_store.path().display()
        );
        Ok(ip)
    }
}
