//! Typed view of the cluster membership daemon (`ctdb`).
//!
//! The daemon is driven through its JSON CLI. Parsing is kept in free
//! functions so it can be exercised against captured outputs without a
//! running daemon.

use crate::host::command::{CommandError, CommandRunner};
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const HEALTHY_FLAGS: &str = "OK";

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("ctdb {command} failed: {stderr}")]
    Failed { command: String, stderr: String },
    #[error("ctdb {command} output could not be parsed: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonNode {
    #[serde(default)]
    pub pnn: Option<i64>,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonPublicIp {
    pub public_ip: String,
    #[serde(default)]
    pub pnn: Option<i64>,
    #[serde(default)]
    pub netmask: Option<u8>,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonNodeStatus {
    #[serde(default)]
    pub pnn: Option<i64>,
    #[serde(default)]
    pub address: Option<String>,
    pub flags_str: String,
}

impl DaemonNodeStatus {
    pub fn is_ok(&self) -> bool {
        self.flags_str == HEALTHY_FLAGS
    }
}

/// Narrow interface over the live daemon.
#[async_trait]
pub trait ClusterDaemonClient: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<DaemonNode>, DaemonError>;
    async fn list_public_ips(&self) -> Result<Vec<DaemonPublicIp>, DaemonError>;
    async fn node_status(&self) -> Result<Vec<DaemonNodeStatus>, DaemonError>;

    /// True iff the daemon reports at least one node and every node is `OK`.
    async fn healthy(&self) -> Result<bool, DaemonError> {
        Ok(all_nodes_healthy(&self.node_status().await?))
    }
}

pub fn all_nodes_healthy(status: &[DaemonNodeStatus]) -> bool {
    !status.is_empty() && status.iter().all(DaemonNodeStatus::is_ok)
}

#[derive(Deserialize)]
struct ListNodesDoc {
    #[serde(default)]
    nodelist: Vec<DaemonNode>,
}

#[derive(Deserialize)]
struct PublicIpsDoc {
    #[serde(default)]
    public_ips: Vec<DaemonPublicIp>,
}

#[derive(Deserialize)]
struct StatusDoc {
    nodemap: NodeMapDoc,
}

#[derive(Deserialize)]
struct NodeMapDoc {
    #[serde(default)]
    nodes: Vec<DaemonNodeStatus>,
}

fn decode<T: for<'de> Deserialize<'de>>(command: &str, raw: &str) -> Result<T, DaemonError> {
    serde_json::from_str(raw).map_err(|source| DaemonError::Decode {
        command: command.to_string(),
        source,
    })
}

/// An empty document means the daemon had nothing to report.
fn is_blank(raw: &str) -> bool {
    raw.trim().is_empty()
}

pub fn parse_list_nodes(raw: &str) -> Result<Vec<DaemonNode>, DaemonError> {
    if is_blank(raw) {
        return Ok(Vec::new());
    }
    Ok(decode::<ListNodesDoc>("listnodes", raw)?.nodelist)
}

pub fn parse_public_ips(raw: &str) -> Result<Vec<DaemonPublicIp>, DaemonError> {
    if is_blank(raw) {
        return Ok(Vec::new());
    }
    Ok(decode::<PublicIpsDoc>("ip all", raw)?.public_ips)
}

pub fn parse_status(raw: &str) -> Result<Vec<DaemonNodeStatus>, DaemonError> {
    if is_blank(raw) {
        return Ok(Vec::new());
    }
    Ok(decode::<StatusDoc>("status", raw)?.nodemap.nodes)
}

/// `ctdb -j` client.
pub struct CtdbCli {
    runner: Arc<dyn CommandRunner>,
    binary: String,
}

impl CtdbCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "ctdb".into(),
        }
    }

    async fn json(&self, command: &[&str]) -> Result<String, DaemonError> {
        let mut args = vec!["-j"];
        args.extend_from_slice(command);
        let output = self.runner.run(&self.binary, &args).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            let command = command.join(" ");
            warn!(
                "event=ctdb_command_failed command={command:?} code={:?} stderr={}",
                output.code,
                output.diagnostic()
            );
            Err(DaemonError::Failed {
                command,
                stderr: output.diagnostic(),
            })
        }
    }
}

#[async_trait]
impl ClusterDaemonClient for CtdbCli {
    async fn list_nodes(&self) -> Result<Vec<DaemonNode>, DaemonError> {
        parse_list_nodes(&self.json(&["listnodes"]).await?)
    }

    async fn list_public_ips(&self) -> Result<Vec<DaemonPublicIp>, DaemonError> {
        parse_public_ips(&self.json(&["ip", "all"]).await?)
    }

    async fn node_status(&self) -> Result<Vec<DaemonNodeStatus>, DaemonError> {
        parse_status(&self.json(&["status"]).await?)
    }
}
