use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use futures::FutureExt;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use crate::error::{Error, Result};
use super::handler::BatchHandler;
use super::queue::QueueShared;
use super::request::{Request, Responder};

/// Bounds applied to every batch a worker assembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Largest number of requests dispatched together
    pub max_batch_size: usize,

    /// Longest wait, measured from the first request of a batch, before dispatching
    pub batch_timeout: Duration,
}

impl BatchPolicy {
    pub fn new(max_batch_size: usize, batch_timeout: Duration) -> Result<Self> {
        let policy = Self { max_batch_size, batch_timeout };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::InvalidPolicy("max_batch_size must be at least 1".into()));
        }
        if self.batch_timeout.is_zero() {
            return Err(Error::InvalidPolicy("batch_timeout must be greater than zero".into()));
        }
        Ok(())
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_batch_size: 8,
            batch_timeout: Duration::from_millis(100),
        }
    }
}

/// An ordered group of requests assembled by one worker.
///
/// Never empty: a batch is only opened once its first request has been pulled.
pub(crate) struct Batch<I, O> {
    requests: Vec<Request<I, O>>,
    opened_at: Instant,
}

impl<I, O> Batch<I, O> {
    fn open(first: Request<I, O>, capacity: usize) -> Self {
        let mut requests = Vec::with_capacity(capacity);
        requests.push(first);
        Self {
            requests,
            opened_at: Instant::now(),
        }
    }

    fn push(&mut self, request: Request<I, O>) {
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    fn into_parts(self) -> (Vec<I>, Vec<Responder<O>>) {
        self.requests.into_iter().map(Request::into_parts).unzip()
    }
}

/// The per-worker assembly loop.
///
/// Runs until `shutdown` fires or the queue is closed and drained. Failures of
/// a single batch are delivered to its requests and never end the loop.
pub(crate) async fn batching_loop<I, O, H>(
    worker_id: usize,
    handler: Arc<H>,
    shared: Arc<QueueShared<I, O>>,
    policy: BatchPolicy,
    shutdown: CancellationToken,
) where
    I: Send + 'static,
    O: Send + 'static,
    H: BatchHandler<I, O>,
{
    info!(worker_id, "batch worker started");
    while let Some(batch) = assemble_batch(&shared, &policy, &shutdown).await {
        dispatch_batch(worker_id, handler.as_ref(), batch).await;
    }
    info!(worker_id, "batch worker stopped");
}

/// Pulls requests into a batch bounded by `policy`.
///
/// The receiver stays locked for the whole assembly window so a burst lands
/// in one batch; the batch is processed after the lock is released.
async fn assemble_batch<I, O>(
    shared: &QueueShared<I, O>,
    policy: &BatchPolicy,
    shutdown: &CancellationToken,
) -> Option<Batch<I, O>> {
    let mut receiver = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return None,
        receiver = shared.receiver.lock() => receiver,
    };

    // No clock runs until there is a first request.
    let first = loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return None,
            request = receiver.recv() => request?,
        };
        shared.depth.fetch_sub(1, Ordering::SeqCst);
        if !request.pick_up() {
            debug!(request = %request.id(), "skipping abandoned request");
            request.discard();
            continue;
        }
        break request;
    };

    let deadline = Instant::now() + policy.batch_timeout;
    let mut batch = Batch::open(first, policy.max_batch_size);

    while batch.len() < policy.max_batch_size {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = timeout_at(deadline, receiver.recv()) => next,
        };
        match next {
            Ok(Some(request)) => {
                shared.depth.fetch_sub(1, Ordering::SeqCst);
                if !request.pick_up() {
                    debug!(request = %request.id(), "skipping abandoned request");
                    request.discard();
                } else {
                    batch.push(request);
                }
            }
            // closed, or the time budget is spent
            Ok(None) | Err(_) => break,
        }
    }

    Some(batch)
}

/// Runs `handler` over one batch and resolves every request in it.
pub(crate) async fn dispatch_batch<I, O, H>(worker_id: usize, handler: &H, batch: Batch<I, O>)
where
    H: BatchHandler<I, O>,
{
    let size = batch.len();
    let assembled_in = batch.opened_at.elapsed();
    let (inputs, responders) = batch.into_parts();
    debug!(worker_id, size, ?assembled_in, "dispatching batch");

    let outcome = AssertUnwindSafe(handler.handle_batch(inputs))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(results)) if results.len() == size => {
            for (responder, result) in responders.into_iter().zip(results) {
                responder.resolve(result);
            }
        }
        Ok(Ok(results)) => {
            let err = Error::ResultCountMismatch { expected: size, actual: results.len() };
            warn!(worker_id, size, error = %err, "batch handler broke the result contract");
            fail_all(responders, err);
        }
        Ok(Err(err)) => {
            warn!(worker_id, size, error = %err, "batch failed");
            fail_all(responders, err);
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(worker_id, size, panic = %message, "batch handler panicked");
            fail_all(responders, Error::BatchProcessing(message));
        }
    }
}

fn fail_all<O>(responders: Vec<Responder<O>>, err: Error) {
    for responder in responders {
        responder.resolve(Err(err.clone()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("batch handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("batch handler panicked: {message}")
    } else {
        "batch handler panicked".to_owned()
    }
}
