//! Clustered-filesystem collaborators: peer discovery and volume control.

use crate::host::command::{CommandError, CommandRunner};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub const REPLICATE_TYPE: &str = "Replicate";
pub const STARTED_STATUS: &str = "Started";
const LOCALHOST: &str = "localhost";

#[derive(Debug, Error)]
pub enum GlusterError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("gluster {command} failed: {stderr}")]
    Failed { command: String, stderr: String },
    #[error("could not parse gluster {command} output: {detail}")]
    Parse { command: String, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    pub hostname: String,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    pub name: String,
    pub volume_type: String,
    pub status: String,
    pub replica_count: u32,
    pub brick_count: u32,
}

impl VolumeInfo {
    pub fn is_started(&self) -> bool {
        self.status == STARTED_STATUS
    }
}

#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Every peer in the trusted pool, including the local node.
    async fn list_peers(&self) -> Result<Vec<Peer>, GlusterError>;
}

#[async_trait]
pub trait VolumeManager: Send + Sync {
    async fn volume_info(&self, name: &str) -> Result<Option<VolumeInfo>, GlusterError>;
    async fn create_volume(
        &self,
        name: &str,
        bricks: &[String],
        replica: u32,
    ) -> Result<(), GlusterError>;
    async fn start_volume(&self, name: &str) -> Result<(), GlusterError>;
    async fn stop_volume(&self, name: &str, force: bool) -> Result<(), GlusterError>;
    async fn delete_volume(&self, name: &str) -> Result<(), GlusterError>;
}

/// Parses `gluster pool list`:
///
/// ```text
/// UUID                                    Hostname        State
/// 7a8f...                                 10.0.0.2        Connected
/// c1d2...                                 localhost       Connected
/// ```
pub fn parse_pool_list(raw: &str) -> Result<Vec<Peer>, GlusterError> {
    let mut peers = Vec::new();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() || fields[0] == "UUID" {
            continue;
        }
        if fields.len() < 3 {
            return Err(GlusterError::Parse {
                command: "pool list".into(),
                detail: format!("unexpected row {line:?}"),
            });
        }
        peers.push(Peer {
            hostname: fields[1].to_string(),
            connected: fields[2] == "Connected",
        });
    }
    Ok(peers)
}

/// Parses `gluster volume info <name>` for a single volume.
pub fn parse_volume_info(raw: &str) -> Result<VolumeInfo, GlusterError> {
    let parse_err = |detail: String| GlusterError::Parse {
        command: "volume info".into(),
        detail,
    };
    let mut name = None;
    let mut volume_type = None;
    let mut status = None;
    let mut bricks = None;
    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Volume Name" => name = Some(value.to_string()),
            "Type" => volume_type = Some(value.to_string()),
            "Status" => status = Some(value.to_string()),
            "Number of Bricks" => bricks = Some(value.to_string()),
            _ => {}
        }
    }
    let bricks = bricks.ok_or_else(|| parse_err("missing brick count".into()))?;
    let (replica_count, brick_count) = parse_brick_layout(&bricks)
        .ok_or_else(|| parse_err(format!("unrecognised brick layout {bricks:?}")))?;
    Ok(VolumeInfo {
        name: name.ok_or_else(|| parse_err("missing volume name".into()))?,
        volume_type: volume_type.ok_or_else(|| parse_err("missing type".into()))?,
        status: status.ok_or_else(|| parse_err("missing status".into()))?,
        replica_count,
        brick_count,
    })
}

/// `"1 x 3 = 3"` is (replica 3, bricks 3); a bare `"3"` has no replication.
/// Arbiter volumes report `"1 x (2 + 1) = 3"`, where the arbiter brick
/// counts towards the replica.
fn parse_brick_layout(raw: &str) -> Option<(u32, u32)> {
    if let Some((layout, total)) = raw.split_once('=') {
        let total: u32 = total.trim().parse().ok()?;
        let (_, per_set) = layout.split_once('x')?;
        let per_set = per_set.trim();
        let replica = match per_set.strip_prefix('(') {
            Some(group) => group
                .strip_suffix(')')?
                .split('+')
                .map(|term| term.trim().parse::<u32>().ok())
                .sum::<Option<u32>>()?,
            None => per_set.split_whitespace().next()?.parse().ok()?,
        };
        Some((replica, total))
    } else {
        let total: u32 = raw.trim().parse().ok()?;
        Some((1, total))
    }
}

/// `gluster --mode=script` client.
pub struct GlusterCli {
    runner: Arc<dyn CommandRunner>,
}

impl GlusterCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn gluster(&self, args: &[&str]) -> Result<crate::host::CommandOutput, GlusterError> {
        let mut full = vec!["--mode=script"];
        full.extend_from_slice(args);
        Ok(self.runner.run("gluster", &full).await?)
    }

    async fn gluster_ok(&self, args: &[&str]) -> Result<String, GlusterError> {
        let output = self.gluster(args).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            let command = args.join(" ");
            warn!(
                "event=gluster_command_failed command={command:?} stderr={}",
                output.diagnostic()
            );
            Err(GlusterError::Failed {
                command,
                stderr: output.diagnostic(),
            })
        }
    }
}

#[async_trait]
impl PeerDirectory for GlusterCli {
    /// The local pool view names this node `localhost`, which is useless
    /// as a brick host. A connected remote peer's view supplies the real
    /// name.
    async fn list_peers(&self) -> Result<Vec<Peer>, GlusterError> {
        let local = parse_pool_list(&self.gluster_ok(&["pool", "list"]).await?)?;
        let Some(remote) = local
            .iter()
            .find(|peer| peer.connected && peer.hostname != LOCALHOST)
            .map(|peer| peer.hostname.clone())
        else {
            return Ok(local);
        };
        let remote_flag = format!("--remote-host={remote}");
        let remote_view =
            parse_pool_list(&self.gluster_ok(&[remote_flag.as_str(), "pool", "list"]).await?)?;
        merge_pool_views(local, &remote_view)
    }
}

/// Replaces the local `localhost` entry with the one name the remote view
/// has that the local view lacks.
pub fn merge_pool_views(local: Vec<Peer>, remote: &[Peer]) -> Result<Vec<Peer>, GlusterError> {
    let unknown: Vec<&Peer> = remote
        .iter()
        .filter(|peer| peer.hostname != LOCALHOST)
        .filter(|peer| !local.iter().any(|known| known.hostname == peer.hostname))
        .collect();
    let [ours] = unknown.as_slice() else {
        return Err(GlusterError::Parse {
            command: "pool list".into(),
            detail: format!(
                "expected exactly one unknown peer in the remote view, found {}",
                unknown.len()
            ),
        });
    };
    let mut merged: Vec<Peer> = local
        .into_iter()
        .filter(|peer| peer.hostname != LOCALHOST)
        .collect();
    merged.push(Peer {
        hostname: ours.hostname.clone(),
        connected: true,
    });
    Ok(merged)
}

#[async_trait]
impl VolumeManager for GlusterCli {
    async fn volume_info(&self, name: &str) -> Result<Option<VolumeInfo>, GlusterError> {
        let output = self.gluster(&["volume", "info", name]).await?;
        if !output.success() {
            let diagnostic = output.diagnostic();
            if diagnostic.contains("does not exist") {
                debug!("event=volume_absent volume={name}");
                return Ok(None);
            }
            return Err(GlusterError::Failed {
                command: format!("volume info {name}"),
                stderr: diagnostic,
            });
        }
        parse_volume_info(&output.stdout).map(Some)
    }

    async fn create_volume(
        &self,
        name: &str,
        bricks: &[String],
        replica: u32,
    ) -> Result<(), GlusterError> {
        let replica = replica.to_string();
        let mut args = vec!["volume", "create", name, "replica", replica.as_str()];
        args.extend(bricks.iter().map(String::as_str));
        args.push("force");
        self.gluster_ok(&args).await?;
        info!("event=volume_created volume={name} replica={replica} bricks={bricks:?}");
        Ok(())
    }

    async fn start_volume(&self, name: &str) -> Result<(), GlusterError> {
        self.gluster_ok(&["volume", "start", name]).await?;
        info!("event=volume_started volume={name}");
        Ok(())
    }

    async fn stop_volume(&self, name: &str, force: bool) -> Result<(), GlusterError> {
        let mut args = vec!["volume", "stop", name];
        if force {
            args.push("force");
        }
        self.gluster_ok(&args).await?;
        info!("event=volume_stopped volume={name} force={force}");
        Ok(())
    }

    async fn delete_volume(&self, name: &str) -> Result<(), GlusterError> {
        self.gluster_ok(&["volume", "delete", name]).await?;
        info!("event=volume_deleted volume={name}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL: &str = "UUID\t\t\t\t\tHostname \tState\n\
        5ad9a0c1-8b1e-4f4e-9d38-0e2c07e2f7a1\t10.0.0.2 \tConnected \n\
        8e1d2b3a-77f0-4b43-a2f6-6f2cbb0f4f11\t10.0.0.3 \tDisconnected \n\
        0f4d59c2-1a7e-4c3a-bb0e-3f2f7e6f9c20\tlocalhost\tConnected \n";

    const REPLICATED: &str = "\n\
Volume Name: ctdb_shared_vol\n\
Type: Replicate\n\
Volume ID: 1f8e2f04-1c9e-4d0e-8a4f-30b1b3ab3a8e\n\
Status: Started\n\
Snapshot Count: 0\n\
Number of Bricks: 1 x 3 = 3\n\
Transport-type: tcp\n\
Bricks:\n\
Brick1: 10.0.0.1:/var/db/system/ctdb_shared_vol\n\
Brick2: 10.0.0.2:/var/db/system/ctdb_shared_vol\n\
Brick3: 10.0.0.3:/var/db/system/ctdb_shared_vol\n";

    const DISTRIBUTED: &str = "Volume Name: ctdb_shared_vol\n\
Type: Distribute\n\
Status: Created\n\
Number of Bricks: 3\n";

    #[test]
    fn pool_list_reports_connection_state() {
        let peers = parse_pool_list(POOL).unwrap();
        assert_eq!(peers.len(), 3);
        assert_eq!(peers[0].hostname, "10.0.0.2");
        assert!(peers[0].connected);
        assert!(!peers[1].connected);
        assert_eq!(peers[2].hostname, "localhost");
    }

    #[test]
    fn replicated_volume_layout() {
        let info = parse_volume_info(REPLICATED).unwrap();
        assert_eq!(info.name, "ctdb_shared_vol");
        assert_eq!(info.volume_type, REPLICATE_TYPE);
        assert!(info.is_started());
        assert_eq!(info.replica_count, 3);
        assert_eq!(info.brick_count, 3);
    }

    #[test]
    fn arbiter_layout_counts_the_arbiter_brick() {
        let raw = REPLICATED.replace("1 x 3 = 3", "1 x (2 + 1) = 3");
        let info = parse_volume_info(&raw).unwrap();
        assert_eq!(info.volume_type, REPLICATE_TYPE);
        assert_eq!(info.replica_count, 3);
        assert_eq!(info.brick_count, 3);
        assert_eq!(parse_brick_layout("2 x (2 + 1) = 6"), Some((3, 6)));
        assert_eq!(parse_brick_layout("1 x (2 + one) = 3"), None);
    }

    #[test]
    fn distributed_volume_has_no_replication() {
        let info = parse_volume_info(DISTRIBUTED).unwrap();
        assert_eq!(info.volume_type, "Distribute");
        assert!(!info.is_started());
        assert_eq!(info.replica_count, 1);
        assert_eq!(info.brick_count, 3);
    }

    #[test]
    fn remote_view_names_the_local_node() {
        let local = parse_pool_list(POOL).unwrap();
        let remote = vec![
            Peer {
                hostname: "localhost".into(),
                connected: true,
            },
            Peer {
                hostname: "10.0.0.1".into(),
                connected: true,
            },
            Peer {
                hostname: "10.0.0.3".into(),
                connected: false,
            },
        ];
        let merged = merge_pool_views(local, &remote).unwrap();
        let names: Vec<_> = merged.iter().map(|p| p.hostname.as_str()).collect();
        assert_eq!(names, vec!["10.0.0.2", "10.0.0.3", "10.0.0.1"]);
        assert!(merged[2].connected);
    }

    #[test]
    fn ambiguous_remote_view_is_rejected() {
        let local = parse_pool_list(POOL).unwrap();
        let remote = vec![
            Peer {
                hostname: "10.0.0.7".into(),
                connected: true,
            },
            Peer {
                hostname: "10.0.0.8".into(),
                connected: true,
            },
        ];
        assert!(merge_pool_views(local, &remote).is_err());
    }

    #[test]
    fn missing_fields_fail_to_parse() {
        assert!(parse_volume_info("Volume Name: x\n").is_err());
        assert!(parse_pool_list("UUID Hostname State\nabc\n").is_err());
    }
}
