use std::future::Future;
use async_trait::async_trait;
use crate::error::Result;

/// Processes one assembled batch.
///
/// Implementations receive the payloads of a batch in submission order and
/// must return one outcome per payload, in the same order. Returning `Err`
/// fails every request of the batch with that error; an `Err` inside the
/// vector fails only the corresponding request.
///
/// Any `Fn(Vec<I>) -> impl Future<Output = Result<Vec<Result<O>>>>` closure is a handler.
#[async_trait]
pub trait BatchHandler<I, O>: Send + Sync + 'static {
    async fn handle_batch(&self, inputs: Vec<I>) -> Result<Vec<Result<O>>>;
}

#[async_trait]
impl<I, O, F, Fut> BatchHandler<I, O> for F
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(Vec<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Result<O>>>> + Send,
{
    async fn handle_batch(&self, inputs: Vec<I>) -> Result<Vec<Result<O>>> {
        self(inputs).await
    }
}
