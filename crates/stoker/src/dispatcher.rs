//! # Dispatcher
//!
//! The entry point callers use: owns the single selected backend and exposes
//! single, batched and streaming inference on top of it.

use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::backend::{Backend, BackendFactory, BackendKind, HostProbe};
use crate::batching::{BatchHandler, BatchQueue};
use crate::cache::{CacheStats, ResultCache};
use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::selection::{BackendSelection, BackendSelector, GpuProfile, InstanceHints, SelectionReason};
use crate::stream::TokenStream;
use crate::telemetry::MemorySnapshot;

/// Serializes calls into a backend that is not safe for concurrent use.
///
/// Open when the backend reports itself [`Backend::concurrent_safe`].
#[derive(Clone, Default)]
struct InvocationGate {
    lock: Option<Arc<Mutex<()>>>,
}

impl InvocationGate {
    fn for_backend<B: Backend>(backend: &B) -> Self {
        Self {
            lock: (!backend.concurrent_safe()).then(|| Arc::new(Mutex::new(()))),
        }
    }

    async fn enter(&self) -> Option<OwnedMutexGuard<()>> {
        match &self.lock {
            Some(lock) => Some(lock.clone().lock_owned().await),
            None => None,
        }
    }

    fn shared_lock(&self) -> Option<Arc<Mutex<()>>> {
        self.lock.clone()
    }
}

/// Feeds queue-assembled batches to the backend's batch path.
struct BackendBatchHandler<B> {
    backend: Arc<B>,
    gate: InvocationGate,
}

#[async_trait]
impl<B: Backend> BatchHandler<B::Input, B::Output> for BackendBatchHandler<B> {
    async fn handle_batch(&self, inputs: Vec<B::Input>) -> Result<Vec<Result<B::Output>>> {
        let _permit = self.gate.enter().await;
        self.backend.batch_infer(inputs).await
    }
}

/// Serializable summary of a running dispatcher, for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherInfo {
    pub backend: BackendKind,
    pub reason: SelectionReason,
    pub model_path: PathBuf,
    pub prefer_gpu: bool,
    pub instance_type: Option<String>,
    pub gpu_profile: Option<GpuProfile>,
    pub batching_enabled: bool,
    pub workers: usize,
    pub queue_depth: usize,
    pub cache: Option<CacheStats>,
}

/// # Dispatcher
///
/// Binds exactly one backend, chosen once at construction, and routes every
/// inference call to it.
///
/// ## Operations
///
/// * [`Dispatcher::infer`] - one input, through the batch queue when batching is enabled
/// * [`Dispatcher::batch_infer`] - caller-controlled chunking over the backend's batch path
/// * [`Dispatcher::stream_infer`] - a lazy [`TokenStream`]
/// * [`Dispatcher::infer_cached`] - `infer` behind the content-addressed result cache
///
/// Unless the backend reports itself safe for concurrent use, every call into
/// it, from any worker or caller, is serialized through one invocation lock.
pub struct Dispatcher<B: Backend> {
    backend: Arc<B>,
    gate: InvocationGate,
    selection: BackendSelection,
    config: DispatcherConfig,
    queue: Option<BatchQueue<B::Input, B::Output>>,
    cache: Option<ResultCache<B::Output>>,
}

impl<B: Backend> Dispatcher<B> {
    /// Select a backend, load the configured model and start the batch
    /// workers if batching is enabled.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] for an invalid configuration
    /// * [`Error::BackendUnavailable`] if not even the CPU backend is available
    /// * [`Error::ModelLoad`] if the backend cannot load the model
    pub async fn new<F>(factory: F, config: DispatcherConfig) -> Result<Self>
    where
        F: BackendFactory<Backend = B>,
    {
        config.validate()?;

        let hints = resolve_hints(&config).await;
        let (mut backend, selection) = BackendSelector::new(config.prefer_gpu)
            .with_hints(hints)
            .select(&factory)?;

        info!(
            backend = %selection.kind,
            reason = %selection.reason,
            model = %config.model_path.display(),
            "loading model"
        );
        backend
            .load_model(&config.model_path)
            .await
            .map_err(|err| match err {
                Error::ModelLoad { .. } => err,
                other => Error::model_load(&config.model_path, other),
            })?;

        let backend = Arc::new(backend);
        let gate = InvocationGate::for_backend(backend.as_ref());

        let queue = if config.batching.enabled {
            let queue = BatchQueue::new(config.batching.policy()?)?
                .with_capacity(config.batching.queue_capacity)?;
            queue.start(
                config.batching.workers,
                BackendBatchHandler {
                    backend: backend.clone(),
                    gate: gate.clone(),
                },
            )?;
            Some(queue)
        } else {
            None
        };

        let cache = config.cache_capacity_nonzero().map(|capacity| {
            ResultCache::new(
                capacity,
                format!("{}@{}", config.model_path.display(), selection.kind),
            )
        });

        info!(
            backend = %selection.kind,
            batching = queue.is_some(),
            cache = cache.is_some(),
            "dispatcher ready"
        );
        Ok(Self {
            backend,
            gate,
            selection,
            config,
            queue,
            cache,
        })
    }

    /// Run a single inference.
    ///
    /// With batching enabled the input is submitted to the batch queue and
    /// this call waits for its batch to be processed.
    pub async fn infer(&self, input: B::Input) -> Result<B::Output> {
        match &self.queue {
            Some(queue) => queue.submit(input)?.await,
            None => {
                let _permit = self.gate.enter().await;
                self.backend.infer(input).await
            }
        }
    }

    /// Like [`Dispatcher::infer`], abandoning the request once `cancel` fires.
    ///
    /// A queued request cancelled before a worker picks it up never reaches
    /// the backend. A direct call stops waiting, leaving the backend to finish
    /// or drop the work on its own.
    pub async fn infer_with_cancel(&self, input: B::Input, cancel: CancellationToken) -> Result<B::Output> {
        match &self.queue {
            Some(queue) => queue.submit_with_cancel(input, cancel)?.await,
            None => tokio::select! {
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = self.infer(input) => result,
            },
        }
    }

    /// Run `inputs` through the backend's batch path in chunks of `batch_size`.
    ///
    /// Without a `batch_size` all inputs go in a single call. Results are in
    /// input order, one per input. A chunk that fails as a whole fails each of
    /// its items with the chunk's error; remaining chunks still run.
    ///
    /// An empty `inputs` returns immediately without calling the backend.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBatchSize`] when `batch_size` is `Some(0)`.
    pub async fn batch_infer(
        &self,
        inputs: Vec<B::Input>,
        batch_size: Option<usize>,
    ) -> Result<Vec<Result<B::Output>>> {
        if batch_size == Some(0) {
            return Err(Error::InvalidBatchSize);
        }
        if inputs.is_empty() {
            return Ok(vec![]);
        }

        let chunk_size = batch_size.unwrap_or(inputs.len());
        let mut results = Vec::with_capacity(inputs.len());
        let mut inputs = inputs.into_iter();
        loop {
            let chunk: Vec<B::Input> = inputs.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let expected = chunk.len();
            debug!(size = expected, "running explicit batch");

            let outcome = {
                let _permit = self.gate.enter().await;
                self.backend.batch_infer(chunk).await
            };
            match outcome {
                Ok(outputs) if outputs.len() == expected => results.extend(outputs),
                Ok(outputs) => {
                    let err = Error::ResultCountMismatch { expected, actual: outputs.len() };
                    warn!(error = %err, "backend broke the batch result contract");
                    results.extend((0..expected).map(|_| Err(err.clone())));
                }
                Err(err) => {
                    warn!(size = expected, error = %err, "batch chunk failed");
                    results.extend((0..expected).map(|_| Err(err.clone())));
                }
            }
        }
        Ok(results)
    }

    /// Start a token-by-token generation.
    ///
    /// The returned stream ends at end-of-sequence or after `max_tokens`
    /// tokens; dropping it early releases the backend's generation state.
    pub async fn stream_infer(&self, input: B::Input, max_tokens: Option<usize>) -> Result<TokenStream<B::Token>> {
        let generation = {
            let _permit = self.gate.enter().await;
            self.backend.stream_infer(input, max_tokens).await?
        };
        Ok(TokenStream::new(generation, max_tokens, self.gate.shared_lock()))
    }

    pub fn selection(&self) -> &BackendSelection {
        &self.selection
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Requests waiting for a batch; always zero without batching.
    pub fn queue_depth(&self) -> usize {
        self.queue.as_ref().map_or(0, BatchQueue::len)
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(ResultCache::stats)
    }

    pub fn info(&self) -> DispatcherInfo {
        DispatcherInfo {
            backend: self.selection.kind,
            reason: self.selection.reason,
            model_path: self.config.model_path.clone(),
            prefer_gpu: self.config.prefer_gpu,
            instance_type: self.selection.instance_type.clone(),
            gpu_profile: self.selection.profile.clone(),
            batching_enabled: self.queue.is_some(),
            workers: self.queue.as_ref().map_or(0, BatchQueue::worker_count),
            queue_depth: self.queue_depth(),
            cache: self.cache_stats(),
        }
    }

    /// Current host and accelerator memory, for observability only.
    pub fn memory_snapshot(&self) -> MemorySnapshot {
        MemorySnapshot::capture(&HostProbe::new())
    }

    /// Stop the batch workers.
    ///
    /// In-flight batches complete; requests still queued fail with
    /// [`Error::QueueClosed`], as does every later batched `infer`. Direct
    /// calls (`batch_infer`, `stream_infer`) keep working until the
    /// dispatcher is dropped.
    pub async fn shutdown(&self) {
        if let Some(queue) = &self.queue {
            queue.stop().await;
        }
        info!(backend = %self.selection.kind, "dispatcher shut down");
    }
}

impl<B> Dispatcher<B>
where
    B: Backend,
    B::Input: Serialize,
    B::Output: Clone,
{
    /// [`Dispatcher::infer`] behind the result cache.
    ///
    /// Falls through to `infer` when no cache capacity is configured. Failed
    /// inferences are not cached.
    pub async fn infer_cached(&self, input: B::Input) -> Result<B::Output> {
        let Some(cache) = &self.cache else {
            return self.infer(input).await;
        };

        let key = cache.key(&input)?;
        if let Some(output) = cache.get(&key) {
            debug!(key = %key, "result cache hit");
            return Ok(output);
        }

        let output = self.infer(input).await?;
        cache.insert(key, output.clone());
        Ok(output)
    }
}

async fn resolve_hints(config: &DispatcherConfig) -> Option<InstanceHints> {
    if let Some(instance_type) = &config.instance_type {
        return Some(InstanceHints::new(instance_type.as_str()));
    }
    if !config.detect_instance {
        return None;
    }

    #[cfg(feature = "cloud-metadata")]
    return crate::selection::detect_instance_hints(config.metadata_timeout()).await;

    #[cfg(not(feature = "cloud-metadata"))]
    {
        warn!("instance detection requested but stoker was built without the cloud-metadata feature");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use futures::StreamExt;
    use futures::future::join_all;
    use crate::backend::mock::{MockBackend, MockState};
    use crate::config::BatchingConfig;

    struct Harness {
        state: Arc<MockState>,
        available: Vec<BackendKind>,
        concurrent: bool,
        delay: Option<Duration>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                state: Arc::new(MockState::default()),
                available: vec![],
                concurrent: false,
                delay: None,
            }
        }

        fn factory(&self) -> impl Fn(BackendKind) -> MockBackend + Send + Sync + 'static {
            let state = self.state.clone();
            let available = self.available.clone();
            let concurrent = self.concurrent;
            let delay = self.delay;
            move |kind: BackendKind| MockBackend {
                kind,
                available: kind == BackendKind::Cpu || available.contains(&kind),
                concurrent,
                delay,
                state: state.clone(),
            }
        }

        async fn dispatcher(&self, config: DispatcherConfig) -> Dispatcher<MockBackend> {
            Dispatcher::new(self.factory(), config).await.unwrap()
        }
    }

    fn batched(max_batch_size: usize, workers: usize) -> DispatcherConfig {
        DispatcherConfig::new("/models/mock.bin").batching(BatchingConfig {
            enabled: true,
            max_batch_size,
            batch_timeout_ms: 100,
            workers,
            queue_capacity: None,
        })
    }

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_model_is_loaded_once() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("/models/mock.bin")).await;

        assert_eq!(harness.state.load_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            harness.state.loaded_path.lock().clone(),
            Some(PathBuf::from("/models/mock.bin"))
        );
        assert_eq!(dispatcher.backend().kind, BackendKind::Cpu);
    }

    #[tokio::test]
    async fn test_model_load_failure_aborts_construction() {
        let harness = Harness::new();
        harness.state.fail_load.store(true, Ordering::SeqCst);

        let result = Dispatcher::new(harness.factory(), DispatcherConfig::new("/models/missing.bin")).await;
        match result {
            Err(Error::ModelLoad { path, source }) => {
                assert_eq!(path, PathBuf::from("/models/missing.bin"));
                assert_eq!(source.to_string(), "no weights");
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("construction should fail"),
        }
    }

    #[tokio::test]
    async fn test_invalid_config_aborts_construction() {
        let harness = Harness::new();
        let result = Dispatcher::new(harness.factory(), batched(0, 1)).await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(harness.state.load_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_selection_prefers_rocm() {
        let mut harness = Harness::new();
        harness.available = vec![BackendKind::Cuda, BackendKind::Rocm];
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;
        assert_eq!(dispatcher.selection().kind, BackendKind::Rocm);

        let cpu_only = harness.dispatcher(DispatcherConfig::new("m").prefer_gpu(false)).await;
        assert_eq!(cpu_only.selection().kind, BackendKind::Cpu);
        assert_eq!(cpu_only.selection().reason, SelectionReason::CpuPreferred);
    }

    #[tokio::test]
    async fn test_unconfirmed_hint_falls_back_to_cpu() {
        let harness = Harness::new();
        let dispatcher = harness
            .dispatcher(DispatcherConfig::new("m").instance_type("g4dn.xlarge"))
            .await;

        let info = dispatcher.info();
        assert_eq!(info.backend, BackendKind::Cpu);
        assert_eq!(info.reason, SelectionReason::HintUnconfirmed);
        assert_eq!(info.instance_type.as_deref(), Some("g4dn.xlarge"));
        assert_eq!(info.gpu_profile.unwrap().family, Some(BackendKind::Cuda));
    }

    #[tokio::test]
    async fn test_direct_infer() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        assert_eq!(dispatcher.infer("a".into()).await.unwrap(), "a/1");
        assert!(matches!(dispatcher.infer("bad".into()).await, Err(Error::Inference(_))));
        assert_eq!(harness.state.infer_calls.load(Ordering::SeqCst), 2);
        assert_eq!(harness.state.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_never_touches_backend() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        assert!(dispatcher.batch_infer(vec![], None).await.unwrap().is_empty());
        assert!(dispatcher.batch_infer(vec![], Some(3)).await.unwrap().is_empty());
        assert_eq!(harness.state.batch_calls(), 0);
        assert_eq!(harness.state.infer_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_infer_chunks_in_order() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        let results = dispatcher
            .batch_infer(words(&["a", "b", "c"]), Some(2))
            .await
            .unwrap();
        let results: Vec<String> = results.into_iter().map(Result::unwrap).collect();

        assert_eq!(results, vec!["a/2", "b/2", "c/1"]);
        assert_eq!(*harness.state.batch_sizes.lock(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_batch_infer_defaults_to_one_call() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        let results = dispatcher.batch_infer(words(&["a", "b", "c"]), None).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(*harness.state.batch_sizes.lock(), vec![3]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        let result = dispatcher.batch_infer(words(&["a"]), Some(0)).await;
        assert!(matches!(result, Err(Error::InvalidBatchSize)));
        assert_eq!(harness.state.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_infer_item_and_chunk_failures() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        let results = dispatcher
            .batch_infer(words(&["boom", "x", "bad", "y"]), Some(2))
            .await
            .unwrap();

        assert!(matches!(results[0], Err(Error::BatchProcessing(_))));
        assert!(matches!(results[1], Err(Error::BatchProcessing(_))));
        assert!(matches!(results[2], Err(Error::Inference(_))));
        assert_eq!(results[3].as_deref().unwrap(), "y/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_infer_groups_concurrent_calls() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(batched(4, 1)).await;

        let calls = ["a", "b", "c", "d"].map(|input| dispatcher.infer(input.to_owned()));
        let results: Vec<String> = join_all(calls).await.into_iter().map(Result::unwrap).collect();

        assert_eq!(results, vec!["a/4", "b/4", "c/4", "d/4"]);
        assert_eq!(*harness.state.batch_sizes.lock(), vec![4]);
        assert_eq!(dispatcher.info().workers, 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invocation_lock_serializes_backend_calls() {
        let mut harness = Harness::new();
        harness.delay = Some(Duration::from_millis(20));
        let dispatcher = harness.dispatcher(batched(1, 2)).await;

        let calls = ["a", "b"].map(|input| dispatcher.infer(input.to_owned()));
        for result in join_all(calls).await {
            result.unwrap();
        }

        assert_eq!(harness.state.batch_calls(), 2);
        assert_eq!(harness.state.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_safe_backend_runs_in_parallel() {
        let mut harness = Harness::new();
        harness.delay = Some(Duration::from_millis(20));
        harness.concurrent = true;
        let dispatcher = harness.dispatcher(batched(1, 2)).await;

        let calls = ["a", "b"].map(|input| dispatcher.infer(input.to_owned()));
        for result in join_all(calls).await {
            result.unwrap();
        }

        assert_eq!(harness.state.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whole_batch_failure_reaches_callers() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(batched(2, 1)).await;

        let calls = ["boom", "fine"].map(|input| dispatcher.infer(input.to_owned()));
        for result in join_all(calls).await {
            assert!(matches!(result, Err(Error::BatchProcessing(_))));
        }

        // the worker survived
        assert_eq!(dispatcher.infer("next".into()).await.unwrap(), "next/1");
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(batched(4, 1)).await;
        dispatcher.shutdown().await;

        assert!(matches!(dispatcher.infer("a".into()).await, Err(Error::QueueClosed)));
        assert_eq!(dispatcher.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_direct_infer() {
        let mut harness = Harness::new();
        harness.delay = Some(Duration::from_secs(60));
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        let token = CancellationToken::new();
        token.cancel();
        let result = dispatcher.infer_with_cancel("a".into(), token).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_stream_runs_to_completion() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        let stream = dispatcher.stream_infer("the quick fox".into(), None).await.unwrap();
        let tokens: Vec<String> = stream.map(Result::unwrap).collect().await;

        assert_eq!(tokens, vec!["the", "quick", "fox"]);
        assert_eq!(harness.state.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_respects_max_tokens() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        let stream = dispatcher.stream_infer("a b c d".into(), Some(3)).await.unwrap();
        let tokens: Vec<String> = stream.map(Result::unwrap).collect().await;

        assert_eq!(tokens, vec!["a", "b", "c"]);
        assert_eq!(harness.state.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_stream_releases_generation() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        let mut stream = dispatcher
            .stream_infer("one two three four five six".into(), None)
            .await
            .unwrap();
        stream.next().await.unwrap().unwrap();
        stream.next().await.unwrap().unwrap();
        drop(stream);

        assert_eq!(harness.state.tokens_generated.load(Ordering::SeqCst), 2);
        assert_eq!(harness.state.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_infer_reuses_results() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m").cache_capacity(8)).await;

        assert_eq!(dispatcher.infer_cached("a".into()).await.unwrap(), "a/1");
        assert_eq!(dispatcher.infer_cached("a".into()).await.unwrap(), "a/1");
        assert_eq!(dispatcher.infer_cached("b".into()).await.unwrap(), "b/1");

        assert_eq!(harness.state.infer_calls.load(Ordering::SeqCst), 2);
        let stats = dispatcher.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m").cache_capacity(8)).await;

        assert!(dispatcher.infer_cached("bad".into()).await.is_err());
        assert!(dispatcher.infer_cached("bad".into()).await.is_err());
        assert_eq!(harness.state.infer_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_uncached_dispatcher_always_infers() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(DispatcherConfig::new("m")).await;

        dispatcher.infer_cached("a".into()).await.unwrap();
        dispatcher.infer_cached("a".into()).await.unwrap();
        assert_eq!(harness.state.infer_calls.load(Ordering::SeqCst), 2);
        assert!(dispatcher.cache_stats().is_none());
    }

    #[tokio::test]
    async fn test_info_serializes() {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher(batched(2, 3)).await;

        let json = serde_json::to_value(dispatcher.info()).unwrap();
        assert_eq!(json["backend"], "cpu");
        assert_eq!(json["reason"], "fallback");
        assert_eq!(json["model_path"], "/models/mock.bin");
        assert_eq!(json["batching_enabled"], true);
        assert_eq!(json["workers"], 3);
        dispatcher.shutdown().await;
    }
}
