use super::{run_blocking, RegistryContext};
use crate::address::{AddressClass, PrivateAddress};
use crate::error::{ClusterError, ClusterResult};
use crate::lock::MutationLock;
use crate::persistence::PrivateLine;
use log::info;
use std::net::IpAddr;
use std::sync::Arc;

/// Node addresses in the private store. Deletion tombstones the line, so
/// node numbering derived from line position never shifts.
#[derive(Clone)]
pub struct PrivateIpRegistry {
    ctx: Arc<RegistryContext>,
    lock: MutationLock,
}

impl PrivateIpRegistry {
    pub fn new(ctx: Arc<RegistryContext>) -> Self {
        let lock = ctx.lock_for(AddressClass::Private);
        Self { ctx, lock }
    }

    pub async fn list(&self) -> ClusterResult<Vec<PrivateAddress>> {
        Ok(self
            .ctx
            .private_addresses()
            .await?
            .into_iter()
            .map(PrivateAddress::new)
            .collect())
    }

    pub async fn create(&self, candidate: PrivateAddress) -> ClusterResult<PrivateAddress> {
        let _guard = self.lock.acquire().await;
        self.ctx.health.check_preconditions().await?;

        let combined = self.ctx.combined_addresses().await?;
        if combined.contains(&candidate.ip) {
            return Err(ClusterError::Conflict {
                ip: candidate.ip.to_string(),
            });
        }

        let store = self.ctx.private_store.clone();
        self.ctx
            .prepare_write(AddressClass::Private, &store, &self.ctx.config.private_link)
            .await?;

        let line = PrivateLine::render_active(&candidate.ip);
        run_blocking(move || store.append(&line).map_err(ClusterError::from)).await?;
        info!(
            "event=private_ip_created ip={} path={}",
            candidate.ip,
            self.ctx.private_store.path().display()
        );
        Ok(candidate)
    }

    pub async fn delete(&self, ip: IpAddr) -> ClusterResult<IpAddr> {
        let _guard = self.lock.acquire().await;
        self.ctx.health.check_preconditions().await?;

        let combined = self.ctx.combined_addresses().await?;
        if !combined.contains(&ip) {
            return Err(ClusterError::not_found(format!("private address {ip}")));
        }

        let store = self.ctx.private_store.clone();
        self.ctx
            .prepare_write(AddressClass::Private, &store, &self.ctx.config.private_link)
            .await?;

        let rendered = PrivateLine::render_active(&ip);
        run_blocking(move || {
            store
                .rewrite_tombstoning(&rendered)
                .map_err(ClusterError::from)
        })
        .await?;
        info!(
            "event=private_ip_deleted ip={ip} path={}",
            self.ctx.private_store.path().display()
        );
        Ok(ip)
    }
}
