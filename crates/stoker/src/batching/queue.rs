use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use crate::error::{Error, Result};
use super::batch::{batching_loop, BatchPolicy};
use super::handler::BatchHandler;
use super::request::{Pending, Request};
use super::worker::BatchWorkerHandle;

/// State shared between the queue front-end and its workers.
pub(crate) struct QueueShared<I, O> {
    /// Single consumer end, handed from worker to worker during assembly
    pub(crate) receiver: Mutex<mpsc::UnboundedReceiver<Request<I, O>>>,

    /// Requests submitted but not yet pulled into a batch
    pub(crate) depth: AtomicUsize,
}

/// # BatchQueue
///
/// A FIFO of pending inference requests drained by a pool of batch workers.
///
/// Each worker repeatedly assembles a batch bounded by the queue's
/// [`BatchPolicy`] and hands it to a [`BatchHandler`]. Within a batch, results
/// follow submission order. Across batches there is no ordering guarantee:
/// with several workers a later request may finish before an earlier one
/// still sitting in a busier worker's batch. Callers needing strict ordering
/// should run a single worker.
///
/// The queue is unbounded unless a capacity is configured, in which case
/// submissions beyond it fail with [`Error::QueueFull`].
pub struct BatchQueue<I, O> {
    sender: mpsc::UnboundedSender<Request<I, O>>,
    shared: Arc<QueueShared<I, O>>,
    policy: BatchPolicy,
    capacity: Option<usize>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    workers: parking_lot::Mutex<Vec<BatchWorkerHandle>>,
}

impl<I, O> BatchQueue<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(policy: BatchPolicy) -> Result<Self> {
        policy.validate()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        Ok(Self {
            sender,
            shared: Arc::new(QueueShared {
                receiver: Mutex::new(receiver),
                depth: AtomicUsize::new(0),
            }),
            policy,
            capacity: None,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            workers: parking_lot::Mutex::new(vec![]),
        })
    }

    /// Reject submissions once `capacity` requests are waiting.
    pub fn with_capacity(mut self, capacity: Option<usize>) -> Result<Self> {
        if capacity == Some(0) {
            return Err(Error::InvalidPolicy("queue capacity must be at least 1".into()));
        }
        self.capacity = capacity;
        Ok(self)
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of requests waiting to be pulled into a batch.
    pub fn len(&self) -> usize {
        self.shared.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Enqueue `input` and return the future its result will arrive on.
    ///
    /// Never waits: the only work done is an atomic enqueue.
    ///
    /// # Errors
    ///
    /// * [`Error::QueueClosed`] once [`BatchQueue::stop`] has been called
    /// * [`Error::QueueFull`] when a capacity is configured and reached
    pub fn submit(&self, input: I) -> Result<Pending<O>> {
        self.enqueue(input, None)
    }

    /// Like [`BatchQueue::submit`], but the request is skipped without any
    /// backend work if `cancel` fires before a worker pulls it.
    pub fn submit_with_cancel(&self, input: I, cancel: CancellationToken) -> Result<Pending<O>> {
        self.enqueue(input, Some(cancel))
    }

    fn enqueue(&self, input: I, cancel: Option<CancellationToken>) -> Result<Pending<O>> {
        if self.is_closed() {
            return Err(Error::QueueClosed);
        }
        self.reserve_slot()?;

        let (request, pending) = Request::new(input, cancel);
        if self.sender.send(request).is_err() {
            self.shared.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::QueueClosed);
        }
        Ok(pending)
    }

    fn reserve_slot(&self) -> Result<()> {
        match self.capacity {
            None => {
                self.shared.depth.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Some(capacity) => self
                .shared
                .depth
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                    (depth < capacity).then_some(depth + 1)
                })
                .map(|_| ())
                .map_err(|_| Error::QueueFull { capacity }),
        }
    }

    /// Launch `worker_count` workers that feed assembled batches to `handler`.
    ///
    /// Must be called from within a Tokio runtime. May be called again to add
    /// workers sharing the same handler type.
    pub fn start<H>(&self, worker_count: usize, handler: H) -> Result<()>
    where
        H: BatchHandler<I, O>,
    {
        if worker_count == 0 {
            return Err(Error::InvalidPolicy("at least one worker is required".into()));
        }
        if self.is_closed() {
            return Err(Error::QueueClosed);
        }

        let handler = Arc::new(handler);
        let mut workers = self.workers.lock();
        let first_id = workers.len();
        for id in first_id..first_id + worker_count {
            let handler = handler.clone();
            let shared = self.shared.clone();
            let policy = self.policy;
            workers.push(BatchWorkerHandle::new(id, &self.shutdown, move |token| {
                tokio::spawn(batching_loop(id, handler, shared, policy, token))
            }));
        }
        info!(
            workers = workers.len(),
            max_batch_size = self.policy.max_batch_size,
            batch_timeout = ?self.policy.batch_timeout,
            "batch workers started"
        );
        Ok(())
    }

    /// Stop accepting work and shut the worker pool down.
    ///
    /// Workers finish the batch they are processing (a partially assembled
    /// batch is still dispatched) and exit. Requests that never made it into
    /// a batch are failed with [`Error::QueueClosed`]. Idempotent.
    pub async fn stop(&self) {
        let already_closed = self.closed.swap(true, Ordering::SeqCst);
        self.shutdown.cancel();

        let mut workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers.iter_mut() {
            worker.join().await;
        }

        let mut receiver = self.shared.receiver.lock().await;
        receiver.close();
        let mut rejected = 0usize;
        while let Ok(request) = receiver.try_recv() {
            self.shared.depth.fetch_sub(1, Ordering::SeqCst);
            request.fail(Error::QueueClosed);
            rejected += 1;
        }

        if already_closed {
            debug!("batch queue already stopped");
        } else {
            info!(workers = workers.len(), rejected, "batch queue stopped");
        }
    }
}

impl<I, O> Drop for BatchQueue<I, O> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
