//! Fixed-capacity pool of producer slots.
//!
//! `submit` waits for a free slot rather than dropping work. Admission control
//! in the gateway keeps live queries at or below pool capacity, so under normal
//! operation a submit never has to wait.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently running a task.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Runs `task` in a pool slot, waiting for one if all are busy.
    ///
    /// The slot is held until the task completes or panics.
    pub async fn submit<F>(&self, task: F) -> Result<JoinHandle<()>, PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        Ok(tokio::spawn(async move {
            let _permit = permit;
            task.await;
        }))
    }

    /// Refuses further submissions. Running tasks keep their slots.
    pub fn close(&self) {
        self.slots.close();
    }
}
