//! Shared-volume files and the local links that point at them.

pub mod store;
pub mod symlink;

pub use store::{
    active_private, public_records, PrivateLine, PublicLine, SharedStore, StoreError,
    TOMBSTONE_PREFIX,
};
pub use symlink::{LinkError, LinkRepair, SymlinkGuard};
