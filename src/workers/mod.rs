//! Proxy worker selection.
//!
//! The dispatcher only sees [`WorkerSelector`]; [`WorkerPool`] is the
//! in-process implementation wired up by the binary.

pub mod launcher;
pub mod pool;

use async_trait::async_trait;

use crate::error::WorkerError;

pub use launcher::{CommandLauncher, DisabledLauncher, WorkerHandle, WorkerLauncher};
pub use pool::WorkerPool;

/// Snapshot of a worker as seen by the pool at selection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDescriptor {
    pub index: u32,
    pub port: u16,
    pub password: String,
    pub running: bool,
}

impl WorkerDescriptor {
    /// Connection details as sent to the user, one field per line.
    pub fn credentials(&self) -> String {
        format!(
            "Id: {}\nPort: {}\nPassword: {}",
            self.index, self.port, self.password
        )
    }
}

/// Source of ready-to-use workers.
///
/// Implementations must make `ensure_running` idempotent and safe to call
/// concurrently for the same worker.
#[async_trait]
pub trait WorkerSelector: Send + Sync {
    /// The worker to offer the next user. Fails with
    /// [`WorkerError::PoolExhausted`] when there is none.
    async fn find_latest(&self) -> Result<WorkerDescriptor, WorkerError>;

    /// Start `worker` if it is not already running.
    async fn ensure_running(&self, worker: &WorkerDescriptor) -> Result<(), WorkerError>;
}
