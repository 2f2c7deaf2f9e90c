//! Bounded subprocess execution.

use crate::timeouts::{with_timeout, KILL_GRACE};
use async_trait::async_trait;
use log::{debug, warn};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stderr, falling back to stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runs a program to completion. A non-zero exit is not an error here;
/// callers decide what an exit code means for their command.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;
}

/// Spawns real processes via `tokio::process` and kills them on timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Same runner with a different bound, used for slow mount calls.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        debug!("event=command_spawn program={program} args={args:?}");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            let (out, err) = tokio::join!(read_pipe(stdout), read_pipe(stderr));
            let status = child.wait().await;
            (status, out, err)
        };
        let outcome = with_timeout(self.timeout, collect).await;
        match outcome {
            Ok((Ok(status), stdout, stderr)) => {
                debug!(
                    "event=command_exit program={program} code={:?}",
                    status.code()
                );
                Ok(CommandOutput {
                    code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Ok((Err(source), _, _)) => Err(CommandError::Spawn {
                program: program.to_string(),
                source,
            }),
            Err(_) => {
                warn!(
                    "event=command_timeout program={program} timeout_ms={}",
                    self.timeout.as_millis()
                );
                if let Err(err) = child.start_kill() {
                    warn!("event=command_kill_error program={program} error={err}");
                }
                let _ = with_timeout(KILL_GRACE, child.wait()).await;
                Err(CommandError::TimedOut {
                    program: program.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(err) = pipe.read_to_end(&mut buf).await {
            warn!("event=command_pipe_error error={err}");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
