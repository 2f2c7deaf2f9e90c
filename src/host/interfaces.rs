use super::command::CommandRunner;
use crate::error::{ClusterError, ClusterResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalInterface {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundAddress {
    pub interface: String,
    pub address: IpAddr,
    pub prefix_len: u8,
    pub dynamic: bool,
}

/// Inventory of the local node's network interfaces.
#[async_trait]
pub trait InterfaceInventory: Send + Sync {
    async fn list_interfaces(&self) -> ClusterResult<Vec<LocalInterface>>;
    /// Addresses currently bound on this node; `static_only` skips
    /// DHCP/SLAAC leases.
    async fn list_bound_addresses(&self, static_only: bool) -> ClusterResult<Vec<BoundAddress>>;
}

#[derive(Debug, Deserialize)]
struct IpLink {
    ifname: String,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    local: Option<String>,
    #[serde(default)]
    prefixlen: u8,
    #[serde(default)]
    dynamic: bool,
}

/// Parses `ip -j addr show` output.
pub fn parse_ip_addr_json(raw: &str) -> Result<Vec<(LocalInterface, Vec<BoundAddress>)>, String> {
    let links: Vec<IpLink> = serde_json::from_str(raw).map_err(|err| err.to_string())?;
    Ok(links
        .into_iter()
        .map(|link| {
            let addresses = link
                .addr_info
                .iter()
                .filter_map(|info| {
                    let address = info.local.as_deref()?.parse::<IpAddr>().ok()?;
                    Some(BoundAddress {
                        interface: link.ifname.clone(),
                        address,
                        prefix_len: info.prefixlen,
                        dynamic: info.dynamic,
                    })
                })
                .collect();
            (LocalInterface { id: link.ifname }, addresses)
        })
        .collect())
}

/// Interface inventory backed by iproute2's JSON output.
pub struct IpCommandInventory {
    runner: Arc<dyn CommandRunner>,
}

impl IpCommandInventory {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn snapshot(&self) -> ClusterResult<Vec<(LocalInterface, Vec<BoundAddress>)>> {
        let output = self.runner.run("ip", &["-j", "addr", "show"]).await?;
        if !output.success() {
            return Err(ClusterError::Unavailable {
                detail: format!("ip addr show: {}", output.diagnostic()),
            });
        }
        parse_ip_addr_json(&output.stdout).map_err(|detail| ClusterError::Decode {
            detail: format!("ip -j addr show: {detail}"),
        })
    }
}

#[async_trait]
impl InterfaceInventory for IpCommandInventory {
    async fn list_interfaces(&self) -> ClusterResult<Vec<LocalInterface>> {
        Ok(self
            .snapshot()
            .await?
            .into_iter()
            .map(|(iface, _)| iface)
            .collect())
    }

    async fn list_bound_addresses(&self, static_only: bool) -> ClusterResult<Vec<BoundAddress>> {
        Ok(self
            .snapshot()
            .await?
            .into_iter()
            .flat_map(|(_, addresses)| addresses)
            .filter(|addr| !(static_only && addr.dynamic))
            .collect())
    }
}
