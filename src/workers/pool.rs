//! In-process worker pool.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::launcher::{WorkerHandle, WorkerLauncher};
use super::{WorkerDescriptor, WorkerSelector};
use crate::error::WorkerError;

struct WorkerSlot {
    index: u32,
    port: u16,
    password: String,
    handle: Option<Box<dyn WorkerHandle>>,
}

impl WorkerSlot {
    /// Poll the handle, dropping it if the worker has gone away.
    fn refresh(&mut self) -> bool {
        let alive = self.handle.as_mut().is_some_and(|h| h.is_alive());
        if !alive && self.handle.take().is_some() {
            warn!(index = self.index, port = self.port, "Worker is no longer running");
        }
        alive
    }

    fn descriptor(&mut self) -> WorkerDescriptor {
        WorkerDescriptor {
            index: self.index,
            port: self.port,
            password: self.password.clone(),
            running: self.refresh(),
        }
    }
}

/// Workers registered at startup, started lazily on first request.
///
/// The newest worker (highest index) is the one handed out. All activation
/// happens under the pool lock, so concurrent `ensure_running` calls for the
/// same worker start it once.
pub struct WorkerPool {
    launcher: Arc<dyn WorkerLauncher>,
    slots: Mutex<Vec<WorkerSlot>>,
}

impl WorkerPool {
    pub fn new(launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self {
            launcher,
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Register a worker with a known password. Indexes are assigned in
    /// registration order, starting at 0.
    pub async fn register(&self, port: u16, password: impl Into<String>) -> WorkerDescriptor {
        let mut slots = self.slots.lock().await;
        let index = slots.len() as u32;
        let mut slot = WorkerSlot {
            index,
            port,
            password: password.into(),
            handle: None,
        };
        let descriptor = slot.descriptor();
        slots.push(slot);
        debug!(index, port, "Worker registered");
        descriptor
    }

    /// Register a worker with a random alphanumeric password.
    pub async fn register_generated(&self, port: u16, password_len: usize) -> WorkerDescriptor {
        self.register(port, generate_password(password_len)).await
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}

#[async_trait]
impl WorkerSelector for WorkerPool {
    async fn find_latest(&self) -> Result<WorkerDescriptor, WorkerError> {
        let mut slots = self.slots.lock().await;
        slots
            .last_mut()
            .map(WorkerSlot::descriptor)
            .ok_or(WorkerError::PoolExhausted)
    }

    async fn ensure_running(&self, worker: &WorkerDescriptor) -> Result<(), WorkerError> {
        let mut slots = self.slots.lock().await;
        let slot = slots
            .iter_mut()
            .find(|s| s.index == worker.index)
            .ok_or(WorkerError::NotFound {
                index: worker.index,
            })?;

        if slot.refresh() {
            debug!(index = slot.index, "Worker already running");
            return Ok(());
        }

        let current = slot.descriptor();
        let handle = self.launcher.launch(&current).await?;
        slot.handle = Some(handle);
        info!(index = slot.index, port = slot.port, "Worker activated");
        Ok(())
    }
}

fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
