use std::path::Path;
use async_trait::async_trait;
use crate::error::Result;
use super::BackendKind;

/// The capability contract every compute backend must fulfil.
///
/// A backend is a stateful handle to loaded model weights plus a
/// hardware/runtime context. The core never inspects tensors or tokens; it
/// only moves `Input`, `Output` and `Token` values between callers and the
/// backend.
///
/// # Lifecycle
///
/// 1. Constructed empty by a [`BackendFactory`]
/// 2. Probed through [`Backend::is_available`] during selection
/// 3. Bound to one model through [`Backend::load_model`], at most once
/// 4. Shared by every worker of the owning dispatcher until it is dropped
///
/// # Concurrency
///
/// Unless [`Backend::concurrent_safe`] returns `true`, the dispatcher
/// serializes every call into the backend through a single invocation lock.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Payload accepted by the model
    type Input: Send + 'static;

    /// Result of a single completed inference
    type Output: Send + 'static;

    /// A single generated token in streaming mode
    type Token: Send + 'static;

    /// Which variant of the closed backend set this is
    fn kind(&self) -> BackendKind;

    /// Cheap, side-effect free hardware/runtime probe
    fn is_available(&self) -> bool;

    /// Whether the backend tolerates concurrent invocations without an external lock
    fn concurrent_safe(&self) -> bool {
        false
    }

    /// Bind the backend to the model stored at `path`.
    ///
    /// May be slow. Called at most once, before the backend is shared.
    async fn load_model(&mut self, path: &Path) -> Result<()>;

    /// Run a single inference
    async fn infer(&self, input: Self::Input) -> Result<Self::Output>;

    /// Run inference over an ordered batch of inputs.
    ///
    /// # Returns
    ///
    /// One outcome per input, in input order. An `Err` at the outer level is a
    /// whole-batch failure; an `Err` inside the vector fails only that item.
    ///
    /// The default implementation calls [`Backend::infer`] for each item in
    /// order and never touches the model for an empty batch.
    async fn batch_infer(&self, inputs: Vec<Self::Input>) -> Result<Vec<Result<Self::Output>>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.push(self.infer(input).await);
        }
        Ok(outputs)
    }

    /// Start a token-by-token generation for `input`.
    ///
    /// `max_tokens` is advisory for the backend; the dispatcher enforces it
    /// regardless.
    async fn stream_infer(
        &self,
        input: Self::Input,
        max_tokens: Option<usize>,
    ) -> Result<Box<dyn Generation<Token = Self::Token>>>;
}

/// Per-call generation state allocated by [`Backend::stream_infer`].
#[async_trait]
pub trait Generation: Send {
    type Token: Send;

    /// Produce the next token, or `None` once the end-of-sequence token is reached
    async fn next_token(&mut self) -> Result<Option<Self::Token>>;

    /// Release backend-side resources held for this generation.
    ///
    /// The token stream calls this exactly once, whether the sequence ran to
    /// completion, hit its token limit, failed, or was abandoned by the caller.
    fn release(&mut self) {}
}

/// Builds a fresh, empty backend for one member of the closed variant set.
pub trait BackendFactory: Send + Sync {
    type Backend: Backend;

    fn create(&self, kind: BackendKind) -> Self::Backend;
}

impl<F, B> BackendFactory for F
where
    F: Fn(BackendKind) -> B + Send + Sync,
    B: Backend,
{
    type Backend = B;

    fn create(&self, kind: BackendKind) -> B {
        self(kind)
    }
}
