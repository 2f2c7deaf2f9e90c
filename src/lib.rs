//! Ordered private and public cluster address files kept on a replicated
//! shared volume, readable before the cluster daemon runs and guarded
//! against unhealthy or concurrent mutation.

pub mod address;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gluster;
pub mod health;
pub mod host;
pub mod lock;
pub mod persistence;
pub mod registry;
pub mod service;
pub mod timeouts;
pub mod volume;

pub use address::{AddressClass, AddressFilter, PrivateAddress, PublicAddress, PublicIpRecord};
pub use config::{ClusterConfig, ConfigError, ServiceNames};
pub use daemon::{ClusterDaemonClient, CtdbCli, DaemonError};
pub use error::{ClusterError, ClusterResult, FieldError, ValidationErrors};
pub use gluster::{GlusterCli, GlusterError, Peer, PeerDirectory, VolumeInfo, VolumeManager};
pub use health::{AuthoritativeSource, HealthGate, MutationDecision};
pub use lock::{LockRegistry, MutationGuard, MutationLock};
pub use persistence::{LinkRepair, SharedStore, SymlinkGuard};
pub use registry::{PrivateIpRegistry, PublicIpRegistry, RegistryContext};
pub use service::{ClusterServices, Collaborators};
pub use volume::{VolumeLifecycle, VolumeStatus};
