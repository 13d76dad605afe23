use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;
use uuid::Uuid;
use crate::error::{Error, Result};

/// # Request
///
/// A submitted payload paired with the single-assignment slot its caller awaits.
///
/// The request is moved into the queue on submission and moved again into
/// exactly one batch; the payload is never copied.
pub(crate) struct Request<I, O> {
    /// Payload to be processed
    input: I,

    /// Slot through which the result travels back to the caller
    responder: Responder<O>,

    /// Optional caller-side cancellation
    cancel: Option<CancellationToken>,

    /// Set once a worker has pulled the request; cancellation is ignored from then on
    picked_up: Arc<AtomicBool>,
}

impl<I, O> Request<I, O> {
    /// Creates a request and the [`Pending`] handle its caller will await.
    pub fn new(input: I, cancel: Option<CancellationToken>) -> (Self, Pending<O>) {
        let (sender, receiver) = oneshot::channel();
        let id = Uuid::new_v4();
        let picked_up = Arc::new(AtomicBool::new(false));
        let request = Self {
            input,
            responder: Responder {
                id,
                submitted_at: Instant::now(),
                sender,
            },
            cancel: cancel.clone(),
            picked_up: picked_up.clone(),
        };
        let pending = Pending {
            id,
            receiver,
            cancelled: cancel.map(|token| Box::pin(token.cancelled_owned())),
            picked_up,
        };
        (request, pending)
    }

    pub fn id(&self) -> Uuid {
        self.responder.id
    }

    /// True when nobody is waiting for the result any more.
    pub fn is_abandoned(&self) -> bool {
        self.responder.sender.is_closed()
            || self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Marks the request as pulled by a worker.
    ///
    /// Returns `false` when the caller already gave up, in which case the
    /// request should be [discarded](Request::discard) instead of batched.
    pub fn pick_up(&self) -> bool {
        self.picked_up.store(true, Ordering::SeqCst);
        !self.is_abandoned()
    }

    /// Splits the request into the payload and its result slot.
    pub fn into_parts(self) -> (I, Responder<O>) {
        (self.input, self.responder)
    }

    /// Resolves the request with `err` without processing it.
    pub fn fail(self, err: Error) {
        self.responder.resolve(Err(err));
    }

    /// Resolves a request skipped because its caller gave up on it.
    pub fn discard(self) {
        let err = if self.responder.sender.is_closed() {
            Error::RequestDropped
        } else {
            Error::Cancelled
        };
        self.fail(err);
    }
}

/// The sending half of a request's result slot.
pub(crate) struct Responder<O> {
    id: Uuid,
    submitted_at: Instant,
    sender: oneshot::Sender<Result<O>>,
}

impl<O> Responder<O> {
    /// Fulfil the slot. A caller that already went away is not an error.
    pub fn resolve(self, result: Result<O>) {
        let waited = self.submitted_at.elapsed();
        if self.sender.send(result).is_err() {
            debug!(request = %self.id, ?waited, "result dropped, caller no longer waiting");
        }
    }
}

/// # Pending
///
/// A future resolving to the outcome of a submitted request.
///
/// Every `Pending` resolves: with the backend's result, with the batch's
/// failure, with [`Error::Cancelled`] if its cancellation token fires before a
/// worker picks the request up, or with [`Error::RequestDropped`] if the
/// request was lost without an answer. Once picked up, the request runs to
/// completion and its result is delivered regardless of the token.
pub struct Pending<O> {
    id: Uuid,

    /// The underlying channel receiver
    receiver: oneshot::Receiver<Result<O>>,

    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,

    picked_up: Arc<AtomicBool>,
}

impl<O> Pending<O> {
    /// Identifier shared with the log lines of the worker handling this request
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<O> Future for Pending<O> {
    type Output = Result<O>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Poll::Ready(result) = Pin::new(&mut this.receiver).poll(cx) {
            return Poll::Ready(result.unwrap_or(Err(Error::RequestDropped)));
        }
        if this.picked_up.load(Ordering::SeqCst) {
            this.cancelled = None;
        }
        if let Some(cancelled) = this.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Err(Error::Cancelled));
            }
        }
        Poll::Pending
    }
}
