use super::command::CommandRunner;
use crate::error::ClusterResult;
use async_trait::async_trait;
use log::{debug, warn};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;

/// Result of a mount or unmount attempt that did not hit a hard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    Done,
    /// The target was already in the requested state.
    AlreadyInState,
    Failed(String),
}

impl MountOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, MountOutcome::Failed(_))
    }
}

#[async_trait]
pub trait MountControl: Send + Sync {
    fn is_mounted(&self, path: &Path) -> std::io::Result<bool>;
    async fn mount_glusterfs(&self, source: &str, target: &Path) -> ClusterResult<MountOutcome>;
    async fn unmount(&self, target: &Path) -> ClusterResult<MountOutcome>;
}

/// A path is a mount point when its device differs from its parent's, or
/// when it is the same inode as its parent (filesystem root).
pub fn is_mount_point(path: &Path) -> std::io::Result<bool> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if meta.file_type().is_symlink() || !meta.is_dir() {
        return Ok(false);
    }
    let parent = std::fs::metadata(path.join(".."))?;
    Ok(meta.dev() != parent.dev() || meta.ino() == parent.ino())
}

/// Uses the system `mount` and `umount` binaries.
pub struct SystemMounts {
    runner: Arc<dyn CommandRunner>,
}

impl SystemMounts {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl MountControl for SystemMounts {
    fn is_mounted(&self, path: &Path) -> std::io::Result<bool> {
        is_mount_point(path)
    }

    async fn mount_glusterfs(&self, source: &str, target: &Path) -> ClusterResult<MountOutcome> {
        let target_str = target.to_string_lossy().into_owned();
        let output = self
            .runner
            .run("mount", &["-t", "glusterfs", source, target_str.as_str()])
            .await?;
        Ok(classify_mount(output.success(), &output.diagnostic()))
    }

    async fn unmount(&self, target: &Path) -> ClusterResult<MountOutcome> {
        let target_str = target.to_string_lossy().into_owned();
        let output = self.runner.run("umount", &["-R", target_str.as_str()]).await?;
        Ok(classify_unmount(output.success(), &output.diagnostic()))
    }
}

pub fn classify_mount(success: bool, diagnostic: &str) -> MountOutcome {
    if success {
        MountOutcome::Done
    } else if diagnostic.contains("is already mounted") {
        debug!("event=mount_already_present detail={diagnostic}");
        MountOutcome::AlreadyInState
    } else {
        warn!("event=mount_failed detail={diagnostic}");
        MountOutcome::Failed(diagnostic.to_string())
    }
}

pub fn classify_unmount(success: bool, diagnostic: &str) -> MountOutcome {
    if success {
        MountOutcome::Done
    } else if diagnostic.contains("not mounted") || diagnostic.contains(": not found") {
        debug!("event=unmount_already_absent detail={diagnostic}");
        MountOutcome::AlreadyInState
    } else {
        warn!("event=unmount_failed detail={diagnostic}");
        MountOutcome::Failed(diagnostic.to_string())
    }
}
