//! Immutable node configuration resolved once at startup.
//!
//! Every path the registries touch lives here. Values come from an optional
//! YAML document, then `CLUSTERADDR_*` environment overrides, then
//! validation; the result is shared by `Arc` and never mutated afterwards.

use crate::timeouts::DEFAULT_COMMAND_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_SHARED_MOUNT: &str = "CLUSTERADDR_SHARED_MOUNT";
pub const ENV_VOLUME_NAME: &str = "CLUSTERADDR_VOLUME_NAME";
pub const ENV_PRIVATE_STORE: &str = "CLUSTERADDR_PRIVATE_STORE";
pub const ENV_PUBLIC_STORE: &str = "CLUSTERADDR_PUBLIC_STORE";
pub const ENV_PRIVATE_LINK: &str = "CLUSTERADDR_PRIVATE_LINK";
pub const ENV_PUBLIC_LINK: &str = "CLUSTERADDR_PUBLIC_LINK";
pub const ENV_COMMAND_TIMEOUT_SECS: &str = "CLUSTERADDR_COMMAND_TIMEOUT_SECS";

const DEFAULT_SHARED_MOUNT: &str = "/cluster/ctdb_shared_vol";
const DEFAULT_VOLUME_NAME: &str = "ctdb_shared_vol";
const DEFAULT_BRICK_ROOT: &str = "/var/db/system";
const DEFAULT_PRIVATE_LINK: &str = "/etc/ctdb/nodes";
const DEFAULT_PUBLIC_LINK: &str = "/etc/ctdb/public_addresses";
const PRIVATE_STORE_NAME: &str = "nodes";
const PUBLIC_STORE_NAME: &str = "public_addresses";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = DEFAULT_COMMAND_TIMEOUT.as_secs();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Names of the host services the core consults or toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNames {
    pub cluster_daemon: String,
    pub filesystem_daemon: String,
    pub event_notifier: String,
}

impl Default for ServiceNames {
    fn default() -> Self {
        Self {
            cluster_daemon: "ctdb".into(),
            filesystem_daemon: "glusterd".into(),
            event_notifier: "glustereventsd".into(),
        }
    }
}

/// Raw on-disk shape; store paths default relative to the mount point.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    shared_mount: Option<PathBuf>,
    volume_name: Option<String>,
    brick_root: Option<PathBuf>,
    private_store: Option<PathBuf>,
    public_store: Option<PathBuf>,
    private_link: Option<PathBuf>,
    public_link: Option<PathBuf>,
    services: ServiceNames,
    command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterConfig {
    pub shared_mount: PathBuf,
    pub volume_name: String,
    pub brick_root: PathBuf,
    pub private_store: PathBuf,
    pub public_store: PathBuf,
    pub private_link: PathBuf,
    pub public_link: PathBuf,
    pub services: ServiceNames,
    pub command_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default(), None)
    }
}

impl ClusterConfig {
    /// Builds a config whose shared files and local links all live under
    /// `root`, which is convenient for sandboxes and tests.
    pub fn rooted_at(root: &Path) -> Self {
        let shared_mount = root.join("cluster").join(DEFAULT_VOLUME_NAME);
        let etc = root.join("etc").join("ctdb");
        Self {
            private_store: shared_mount.join(PRIVATE_STORE_NAME),
            public_store: shared_mount.join(PUBLIC_STORE_NAME),
            shared_mount,
            volume_name: DEFAULT_VOLUME_NAME.into(),
            brick_root: root.join("bricks"),
            private_link: etc.join(PRIVATE_STORE_NAME),
            public_link: etc.join(PUBLIC_STORE_NAME),
            services: ServiceNames::default(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }

    /// Loads `path`, applies environment overrides and validates the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: RawConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        // Relative paths are relative to the config file location.
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::from_raw(parsed, Some(&base));
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for hosts without a config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig, base: Option<&Path>) -> Self {
        let resolve = |path: PathBuf| match base {
            Some(base) => resolve_relative(base, &path),
            None => path,
        };
        let shared_mount = resolve(
            raw.shared_mount
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SHARED_MOUNT)),
        );
        let private_store = raw
            .private_store
            .map(&resolve)
            .unwrap_or_else(|| shared_mount.join(PRIVATE_STORE_NAME));
        let public_store = raw
            .public_store
            .map(&resolve)
            .unwrap_or_else(|| shared_mount.join(PUBLIC_STORE_NAME));
        Self {
            volume_name: raw
                .volume_name
                .unwrap_or_else(|| DEFAULT_VOLUME_NAME.into()),
            brick_root: resolve(
                raw.brick_root
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_BRICK_ROOT)),
            ),
            private_link: resolve(
                raw.private_link
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PRIVATE_LINK)),
            ),
            public_link: resolve(
                raw.public_link
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_LINK)),
            ),
            services: raw.services,
            command_timeout_secs: raw
                .command_timeout_secs
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
            shared_mount,
            private_store,
            public_store,
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(mount) = env_path(ENV_SHARED_MOUNT) {
            // Store paths follow the mount unless overridden separately.
            if self.private_store == self.shared_mount.join(PRIVATE_STORE_NAME) {
                self.private_store = mount.join(PRIVATE_STORE_NAME);
            }
            if self.public_store == self.shared_mount.join(PUBLIC_STORE_NAME) {
                self.public_store = mount.join(PUBLIC_STORE_NAME);
            }
            self.shared_mount = mount;
        }
        if let Ok(name) = env::var(ENV_VOLUME_NAME) {
            self.volume_name = name;
        }
        if let Some(path) = env_path(ENV_PRIVATE_STORE) {
            self.private_store = path;
        }
        if let Some(path) = env_path(ENV_PUBLIC_STORE) {
            self.public_store = path;
        }
        if let Some(path) = env_path(ENV_PRIVATE_LINK) {
            self.private_link = path;
        }
        if let Some(path) = env_path(ENV_PUBLIC_LINK) {
            self.public_link = path;
        }
        if let Ok(value) = env::var(ENV_COMMAND_TIMEOUT_SECS) {
            self.command_timeout_secs =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        key: ENV_COMMAND_TIMEOUT_SECS,
                        value,
                    })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.volume_name.trim().is_empty() {
            return Err(ConfigError::Invalid("volume_name must not be empty".into()));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "command_timeout_secs must be greater than zero".into(),
            ));
        }
        for (label, store) in [
            ("private_store", &self.private_store),
            ("public_store", &self.public_store),
        ] {
            if !store.starts_with(&self.shared_mount) {
                return Err(ConfigError::Invalid(format!(
                    "{label} {} is not under shared_mount {}",
                    store.display(),
                    self.shared_mount.display()
                )));
            }
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Brick directory used on every peer when the shared volume is created.
    pub fn brick_path(&self) -> PathBuf {
        self.brick_root.join(&self.volume_name)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// If `path` is relative, joins it to `base`; otherwise returns it unchanged.
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
