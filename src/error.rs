use crate::config::ConfigError;
use crate::daemon::DaemonError;
use crate::gluster::GlusterError;
use crate::host::command::CommandError;
use crate::persistence::store::StoreError;
use crate::persistence::symlink::LinkError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Accumulates validation failures so callers see every problem at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Returns `Err` when at least one failure was recorded.
    pub fn check(self) -> Result<(), ClusterError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ClusterError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.errors {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{}: {}", err.field, err.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("\"{ip}\" already in the cluster")]
    Conflict { ip: String },
    #[error("{what} does not exist")]
    NotFound { what: String },
    #[error("cluster not ready for mutation: {}", .reasons.join("; "))]
    Unhealthy { reasons: Vec<String> },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("volume \"{volume}\" has an unsupported layout: {detail}")]
    ConfigurationConflict { volume: String, detail: String },
    #[error("collaborator unavailable: {detail}")]
    Unavailable { detail: String },
    #[error("failed to decode collaborator output: {detail}")]
    Decode { detail: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClusterError {
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        ClusterError::Unhealthy {
            reasons: vec![reason.into()],
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ClusterError::NotFound { what: what.into() }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        ClusterError::Validation(errors)
    }

    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::Unhealthy { .. } | ClusterError::Unavailable { .. }
        )
    }
}

impl From<StoreError> for ClusterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { path, source } => ClusterError::Io { path, source },
            StoreError::NotFound { needle, path } => ClusterError::NotFound {
                what: format!("\"{needle}\" in {}", path.display()),
            },
        }
    }
}

impl From<LinkError> for ClusterError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Io { path, source, .. } => ClusterError::Io { path, source },
        }
    }
}

impl From<CommandError> for ClusterError {
    fn from(err: CommandError) -> Self {
        ClusterError::Unavailable {
            detail: err.to_string(),
        }
    }
}

impl From<DaemonError> for ClusterError {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::Command(inner) => inner.into(),
            other @ DaemonError::Decode { .. } => ClusterError::Decode {
                detail: other.to_string(),
            },
            other @ DaemonError::Failed { .. } => ClusterError::Unavailable {
                detail: other.to_string(),
            },
        }
    }
}

impl From<GlusterError> for ClusterError {
    fn from(err: GlusterError) -> Self {
        match err {
            GlusterError::Command(inner) => inner.into(),
            other @ GlusterError::Parse { .. } => ClusterError::Decode {
                detail: other.to_string(),
            },
            other @ GlusterError::Failed { .. } => ClusterError::Unavailable {
                detail: other.to_string(),
            },
        }
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_collect_every_field() {
        let mut errors = ValidationErrors::new();
        errors.add("node_create.netmask", "bad netmask");
        errors.add("node_create.interface", "unknown interface");
        let err = errors.check().expect_err("two failures recorded");
        match &err {
            ClusterError::Validation(inner) => assert_eq!(inner.errors().len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
        let rendered = err.to_string();
        assert!(rendered.contains("bad netmask"));
        assert!(rendered.contains("unknown interface"));
    }

    #[test]
    fn command_timeout_is_retryable_unavailable() {
        let timed_out = CommandError::TimedOut {
            program: "ctdb".into(),
            timeout: std::time::Duration::from_secs(30),
        };
        let err = ClusterError::from(DaemonError::Command(timed_out));
        assert!(matches!(err, ClusterError::Unavailable { .. }), "{err:?}");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("ctdb"));
    }

    #[test]
    fn empty_validation_passes() {
        assert!(ValidationErrors::new().check().is_ok());
    }

    #[test]
    fn retryable_classification() {
        assert!(ClusterError::unhealthy("ctdb not healthy").is_retryable());
        assert!(ClusterError::Unavailable {
            detail: "timeout".into()
        }
        .is_retryable());
        assert!(!ClusterError::Conflict {
            ip: "10.0.0.1".into()
        }
        .is_retryable());
        assert!(!ClusterError::not_found("10.0.0.1").is_retryable());
    }

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: ClusterError = StoreError::NotFound {
            needle: "10.0.0.9".into(),
            path: PathBuf::from("/cluster/nodes"),
        }
        .into();
        assert!(matches!(err, ClusterError::NotFound { .. }));
    }
}
