//! Module for handling background batch processing tasks.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A handle for managing one background worker task of the batch pool.
///
/// This struct provides a convenient way to spawn, stop, and await
/// long-running background tasks in the Tokio runtime.
///
/// # Example
///
/// ```ignore
/// let worker = BatchWorkerHandle::new(0, &shutdown, |token| {
///     tokio::spawn(async move {
///         token.cancelled().await;
///         println!("Worker stopped");
///     })
/// });
///
/// // Worker will be signalled to stop when dropped
/// ```
pub(crate) struct BatchWorkerHandle {
    /// Position of the worker within its pool, used in log lines
    id: usize,

    /// Token observed by the background task; cancelling it stops the worker
    shutdown: CancellationToken,

    /// Handle to the spawned background task, becomes `None` once awaited
    handle: Option<JoinHandle<()>>,
}

impl BatchWorkerHandle {
    /// Creates a new `BatchWorkerHandle` by spawning a background task.
    ///
    /// # Parameters
    ///
    /// * `id` - Position of the worker in its pool
    /// * `parent` - Pool-wide token; cancelling it stops this worker too
    /// * `task` - A function that takes the worker's shutdown token and returns a `JoinHandle`.
    ///   This function is responsible for creating and spawning the actual background task.
    pub fn new<F>(id: usize, parent: &CancellationToken, task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> JoinHandle<()>,
    {
        let shutdown = parent.child_token();
        let handle = task(shutdown.clone());
        Self {
            id,
            shutdown,
            handle: Some(handle),
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Signals the background task to stop after its in-flight batch.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Signals the task to stop and waits for it to exit.
    ///
    /// Calling this more than once is harmless.
    pub async fn join(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(worker_id = self.id, error = %err, "batch worker exited abnormally");
            }
        }
    }
}

impl Drop for BatchWorkerHandle {
    /// Ensures the background task is told to stop when the handle is dropped.
    fn drop(&mut self) {
        self.shutdown();
    }
}
