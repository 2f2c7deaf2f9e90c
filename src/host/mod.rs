//! Host collaborators: subprocesses, services, interfaces and mounts.

pub mod command;
pub mod interfaces;
pub mod mounts;
pub mod services;

pub use command::{CommandError, CommandOutput, CommandRunner, ProcessRunner};
pub use interfaces::{BoundAddress, InterfaceInventory, IpCommandInventory, LocalInterface};
pub use mounts::{is_mount_point, MountControl, MountOutcome, SystemMounts};
pub use services::{ServiceControl, SystemdServices};
