use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use futures::stream::{self, BoxStream, Fuse, FusedStream};
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;
use crate::backend::Generation;
use crate::error::Result;

/// # TokenStream
///
/// A lazy, finite, non-restartable sequence of generated tokens.
///
/// Each element is pulled from the backend only when the consumer asks for
/// it. The stream ends after the backend reports end-of-sequence, after
/// `max_tokens` tokens, or right after yielding the first error, whichever
/// comes first.
///
/// ## Resource handling
///
/// The backend's per-call generation state is released exactly once: as soon
/// as the stream ends, or when the stream is dropped part way through.
/// Abandoning iteration early is therefore always safe.
///
/// Polling again after the end keeps returning `None`.
pub struct TokenStream<T> {
    inner: Fuse<BoxStream<'static, Result<T>>>,
}

impl<T: Send + 'static> TokenStream<T> {
    /// Wraps a backend generation.
    ///
    /// # Parameters
    ///
    /// * `generation` - the per-call state produced by the backend
    /// * `max_tokens` - upper bound on the number of yielded tokens
    /// * `lock` - when present, held for the duration of every `next_token` call
    pub(crate) fn new(
        generation: Box<dyn Generation<Token = T>>,
        max_tokens: Option<usize>,
        lock: Option<Arc<Mutex<()>>>,
    ) -> Self {
        let state = StreamState {
            guard: GenerationGuard { generation: Some(generation) },
            produced: 0,
            max_tokens,
            lock,
        };
        Self {
            inner: stream::unfold(state, next_item).boxed().fuse(),
        }
    }
}

impl<T> Stream for TokenStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

impl<T> FusedStream for TokenStream<T> {
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

struct StreamState<T: Send> {
    guard: GenerationGuard<T>,
    produced: usize,
    max_tokens: Option<usize>,
    lock: Option<Arc<Mutex<()>>>,
}

impl<T: Send> StreamState<T> {
    fn limit_reached(&self) -> bool {
        self.max_tokens.is_some_and(|max| self.produced >= max)
    }
}

async fn next_item<T: Send + 'static>(mut state: StreamState<T>) -> Option<(Result<T>, StreamState<T>)> {
    if state.limit_reached() {
        state.guard.finish();
        return None;
    }

    let next = {
        let generation = state.guard.generation.as_mut()?;
        let _permit = match &state.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        generation.next_token().await
    };

    match next {
        Ok(Some(token)) => {
            state.produced += 1;
            if state.limit_reached() {
                debug!(tokens = state.produced, "token limit reached");
                state.guard.finish();
            }
            Some((Ok(token), state))
        }
        Ok(None) => {
            debug!(tokens = state.produced, "end of sequence");
            state.guard.finish();
            None
        }
        Err(err) => {
            state.guard.finish();
            Some((Err(err), state))
        }
    }
}

/// Owns a generation and releases it exactly once.
struct GenerationGuard<T: Send> {
    generation: Option<Box<dyn Generation<Token = T>>>,
}

impl<T: Send> GenerationGuard<T> {
    fn finish(&mut self) {
        if let Some(mut generation) = self.generation.take() {
            generation.release();
        }
    }
}

impl<T: Send> Drop for GenerationGuard<T> {
    fn drop(&mut self) {
        if self.generation.is_some() {
            debug!("token stream abandoned, releasing generation");
        }
        self.finish();
    }
}
