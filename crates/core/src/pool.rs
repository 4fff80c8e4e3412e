use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded pool shared by ingestion and upload work.
///
/// Work runs as ordinary tokio tasks; the pool only bounds how many of them
/// hold a permit at once. Excess work queues (fairly, FIFO) on the semaphore.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// A pool of `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self { permits: Arc::new(Semaphore::new(size)), size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently idle.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free worker. `None` once the pool has been [closed](Self::close).
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).acquire_owned().await.ok()
    }

    /// Stops handing out workers; queued and future acquisitions get `None`.
    /// Work already holding a worker is unaffected.
    pub fn close(&self) {
        self.permits.close();
    }
}
