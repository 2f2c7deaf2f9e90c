use log::{debug, info};
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRepair {
    AlreadyLinked,
    Created,
    /// A stale file, directory or wrong-target link was removed first.
    Replaced,
}

/// Keeps a node-local config path pointing at its shared-volume file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymlinkGuard;

impl SymlinkGuard {
    /// True when `local` is a symlink whose target is `canonical`.
    pub fn is_linked(local: &Path, canonical: &Path) -> bool {
        match fs::symlink_metadata(local) {
            Ok(meta) if meta.file_type().is_symlink() => resolves_to(local, canonical),
            _ => false,
        }
    }

    pub fn ensure_linked(local: &Path, canonical: &Path) -> Result<LinkRepair, LinkError> {
        let existing = match fs::symlink_metadata(local) {
            Ok(meta) => Some(meta),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(LinkError::Io {
                    op: "inspect",
                    path: local.to_path_buf(),
                    source,
                })
            }
        };

        let repair = match existing {
            Some(meta) if meta.file_type().is_symlink() && resolves_to(local, canonical) => {
                debug!(
                    "event=symlink_ok local={} canonical={}",
                    local.display(),
                    canonical.display()
                );
                return Ok(LinkRepair::AlreadyLinked);
            }
            Some(meta) => {
                let removed = if meta.is_dir() {
                    fs::remove_dir_all(local)
                } else {
                    fs::remove_file(local)
                };
                removed.map_err(|source| LinkError::Io {
                    op: "remove",
                    path: local.to_path_buf(),
                    source,
                })?;
                LinkRepair::Replaced
            }
            None => {
                if let Some(parent) = local.parent() {
                    fs::create_dir_all(parent).map_err(|source| LinkError::Io {
                        op: "create parent of",
                        path: local.to_path_buf(),
                        source,
                    })?;
                }
                LinkRepair::Created
            }
        };

        symlink(canonical, local).map_err(|source| LinkError::Io {
            op: "symlink",
            path: local.to_path_buf(),
            source,
        })?;
        info!(
            "event=symlink_repaired local={} canonical={} repair={repair:?}",
            local.display(),
            canonical.display()
        );
        Ok(repair)
    }
}

/// Compares the link's immediate target; the canonical file may not exist
/// yet, so full resolution cannot be required.
fn resolves_to(local: &Path, canonical: &Path) -> bool {
    let Ok(target) = fs::read_link(local) else {
        return false;
    };
    let target = if target.is_relative() {
        local
            .parent()
            .map(|parent| parent.join(&target))
            .unwrap_or(target)
    } else {
        target
    };
    if target == canonical {
        return true;
    }
    match (fs::canonicalize(&target), fs::canonicalize(canonical)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_link_and_parent() {
        let dir = tempdir().unwrap();
        let canonical = dir.path().join("shared").join("nodes");
        let local = dir.path().join("etc").join("ctdb").join("nodes");
        let repair = SymlinkGuard::ensure_linked(&local, &canonical).unwrap();
        assert_eq!(repair, LinkRepair::Created);
        assert_eq!(fs::read_link(&local).unwrap(), canonical);
        assert!(SymlinkGuard::is_linked(&local, &canonical));
    }

    #[test]
    fn regular_file_is_replaced_then_noop() {
        let dir = tempdir().unwrap();
        let canonical = dir.path().join("nodes.shared");
        let local = dir.path().join("nodes");
        fs::write(&local, "10.9.9.9\n").unwrap();
        assert!(!SymlinkGuard::is_linked(&local, &canonical));
        assert_eq!(
            SymlinkGuard::ensure_linked(&local, &canonical).unwrap(),
            LinkRepair::Replaced
        );
        assert!(SymlinkGuard::is_linked(&local, &canonical));
        assert_eq!(
            SymlinkGuard::ensure_linked(&local, &canonical).unwrap(),
            LinkRepair::AlreadyLinked
        );
    }

    #[test]
    fn wrong_target_is_relinked() {
        let dir = tempdir().unwrap();
        let canonical = dir.path().join("nodes.shared");
        let elsewhere = dir.path().join("nodes.stale");
        fs::write(&elsewhere, "").unwrap();
        let local = dir.path().join("nodes");
        symlink(&elsewhere, &local).unwrap();
        assert_eq!(
            SymlinkGuard::ensure_linked(&local, &canonical).unwrap(),
            LinkRepair::Replaced
        );
        assert_eq!(fs::read_link(&local).unwrap(), canonical);
        assert!(elsewhere.exists(), "old target must not be deleted");
    }

    #[test]
    fn directory_in_the_way_is_replaced() {
        let dir = tempdir().unwrap();
        let canonical = dir.path().join("nodes.shared");
        let local = dir.path().join("nodes");
        fs::create_dir_all(local.join("nested")).unwrap();
        assert_eq!(
            SymlinkGuard::ensure_linked(&local, &canonical).unwrap(),
            LinkRepair::Replaced
        );
        assert!(SymlinkGuard::is_linked(&local, &canonical));
    }

    #[test]
    fn relative_link_to_canonical_counts() {
        let dir = tempdir().unwrap();
        let canonical = dir.path().join("nodes.shared");
        fs::write(&canonical, "").unwrap();
        let local = dir.path().join("nodes");
        symlink("nodes.shared", &local).unwrap();
        assert!(SymlinkGuard::is_linked(&local, &canonical));
    }
}
