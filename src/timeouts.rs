//! Centralized timeout policies for subprocess-backed collaborators.

use std::time::Duration;

/// Upper bound applied to `ctdb`, `gluster`, `systemctl` and `ip` invocations
/// when the config does not say otherwise.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
/// Mount and unmount of a replicated volume can wait on peers to answer.
pub const MOUNT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
/// Grace period granted to a killed child before we stop waiting on it.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Thin wrapper around `tokio::time::timeout` so call sites read uniformly.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}
