//! Worker process launching.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::WorkerDescriptor;
use crate::error::WorkerError;

/// How long a freshly spawned worker must stay up to count as started.
const STARTUP_GRACE: Duration = Duration::from_millis(200);

/// Handle to a started worker, kept by the pool.
pub trait WorkerHandle: Send {
    /// Whether the worker is still up.
    fn is_alive(&mut self) -> bool;
}

impl WorkerHandle for Child {
    fn is_alive(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }
}

/// Starts the process backing a worker.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Start the worker and hand back something to watch it by.
    async fn launch(
        &self,
        worker: &WorkerDescriptor,
    ) -> Result<Box<dyn WorkerHandle>, WorkerError>;
}

/// Launches workers from a whitespace-separated command template.
///
/// `{port}` and `{password}` in any argument are replaced with the worker's
/// values, e.g. `ssserver -s 0.0.0.0:{port} -k {password} -m aes-256-gcm`.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    /// Parse a command template. Returns `None` for a blank template.
    pub fn from_template(template: &str) -> Option<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Arguments with the worker's values substituted.
    pub fn render_args(&self, worker: &WorkerDescriptor) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{port}", &worker.port.to_string())
                    .replace("{password}", &worker.password)
            })
            .collect()
    }
}

#[async_trait]
impl WorkerLauncher for CommandLauncher {
    async fn launch(
        &self,
        worker: &WorkerDescriptor,
    ) -> Result<Box<dyn WorkerHandle>, WorkerError> {
        let mut child = Command::new(&self.program)
            .args(self.render_args(worker))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::ActivationFailed {
                index: worker.index,
                reason: format!("failed to spawn {}: {}", self.program, e),
            })?;

        tokio::time::sleep(STARTUP_GRACE).await;

        match child.try_wait() {
            Ok(None) => {
                info!(
                    index = worker.index,
                    port = worker.port,
                    pid = child.id(),
                    "Worker started"
                );
                Ok(Box::new(child))
            }
            Ok(Some(status)) => Err(WorkerError::ActivationFailed {
                index: worker.index,
                reason: format!("exited during startup with {status}"),
            }),
            Err(e) => {
                debug!(index = worker.index, error = %e, "Could not poll worker process");
                Err(WorkerError::ActivationFailed {
                    index: worker.index,
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Launcher that refuses to start anything, for pools with no worker
/// command configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLauncher;

#[async_trait]
impl WorkerLauncher for DisabledLauncher {
    async fn launch(
        &self,
        worker: &WorkerDescriptor,
    ) -> Result<Box<dyn WorkerHandle>, WorkerError> {
        Err(WorkerError::ActivationFailed {
            index: worker.index,
            reason: "no worker command configured".to_string(),
        })
    }
}
