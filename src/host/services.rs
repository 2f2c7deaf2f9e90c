use super::command::CommandRunner;
use crate::error::{ClusterError, ClusterResult};
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

/// Start/stop/status of host services by unit name.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn is_running(&self, service: &str) -> ClusterResult<bool>;
    async fn start(&self, service: &str) -> ClusterResult<()>;
    async fn stop(&self, service: &str) -> ClusterResult<()>;
}

/// `systemctl` backed service control.
pub struct SystemdServices {
    runner: Arc<dyn CommandRunner>,
}

impl SystemdServices {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn systemctl(&self, verb: &str, service: &str) -> ClusterResult<()> {
        let output = self.runner.run("systemctl", &[verb, service]).await?;
        if output.success() {
            info!("event=service_{verb} service={service}");
            Ok(())
        } else {
            warn!(
                "event=service_{verb}_failed service={service} code={:?} stderr={}",
                output.code,
                output.diagnostic()
            );
            Err(ClusterError::Unavailable {
                detail: format!("systemctl {verb} {service}: {}", output.diagnostic()),
            })
        }
    }
}

#[async_trait]
impl ServiceControl for SystemdServices {
    async fn is_running(&self, service: &str) -> ClusterResult<bool> {
        // `is-active --quiet` exits 0 only for an active unit.
        let output = self
            .runner
            .run("systemctl", &["is-active", "--quiet", service])
            .await?;
        Ok(output.success())
    }

    async fn start(&self, service: &str) -> ClusterResult<()> {
        self.systemctl("start", service).await
    }

    async fn stop(&self, service: &str) -> ClusterResult<()> {
        self.systemctl("stop", service).await
    }
}
