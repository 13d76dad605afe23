use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use crate::backend::{Backend, BackendKind, Generation};
use crate::error::{Error, Result};

/// Observable state shared between a mock backend and the test that created it.
#[derive(Debug, Default)]
pub struct MockState {
    pub load_calls: AtomicUsize,
    pub loaded_path: Mutex<Option<PathBuf>>,
    pub infer_calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
    pub released: AtomicUsize,
    pub tokens_generated: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub fail_load: AtomicBool,
}

impl MockState {
    pub fn batch_calls(&self) -> usize {
        self.batch_sizes.lock().len()
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A string backend for tests.
///
/// * `infer` returns `"{input}/1"`
/// * `batch_infer` returns `"{input}/{batch_len}"` per item
/// * an input of `"bad"` fails only that item, `"boom"` fails the whole batch
/// * `stream_infer` yields the whitespace separated words of the input
#[derive(Debug, Clone)]
pub struct MockBackend {
    pub kind: BackendKind,
    pub available: bool,
    pub concurrent: bool,
    pub delay: Option<Duration>,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub fn new(kind: BackendKind, available: bool) -> Self {
        Self {
            kind,
            available,
            concurrent: false,
            delay: None,
            state: Arc::new(MockState::default()),
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    type Input = String;
    type Output = String;
    type Token = String;

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn concurrent_safe(&self) -> bool {
        self.concurrent
    }

    async fn load_model(&mut self, path: &Path) -> Result<()> {
        self.state.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_load.load(Ordering::SeqCst) {
            return Err(Error::model_load(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no weights"),
            ));
        }
        *self.state.loaded_path.lock() = Some(path.to_path_buf());
        Ok(())
    }

    async fn infer(&self, input: String) -> Result<String> {
        self.state.infer_calls.fetch_add(1, Ordering::SeqCst);
        self.state.enter();
        self.pause().await;
        self.state.exit();
        if input == "bad" {
            return Err(Error::Inference(format!("cannot infer '{input}'")));
        }
        Ok(format!("{input}/1"))
    }

    async fn batch_infer(&self, inputs: Vec<String>) -> Result<Vec<Result<String>>> {
        self.state.batch_sizes.lock().push(inputs.len());
        self.state.enter();
        self.pause().await;
        self.state.exit();
        if inputs.iter().any(|input| input == "boom") {
            return Err(Error::BatchProcessing("mock batch exploded".into()));
        }
        let len = inputs.len();
        Ok(inputs
            .into_iter()
            .map(|input| {
                if input == "bad" {
                    Err(Error::Inference(format!("cannot infer '{input}'")))
                } else {
                    Ok(format!("{input}/{len}"))
                }
            })
            .collect())
    }

    async fn stream_infer(
        &self,
        input: String,
        _max_tokens: Option<usize>,
    ) -> Result<Box<dyn Generation<Token = String>>> {
        let words = input.split_whitespace().map(str::to_owned).collect::<Vec<_>>();
        Ok(Box::new(MockGeneration {
            words: words.into_iter(),
            state: self.state.clone(),
        }))
    }
}

struct MockGeneration {
    words: std::vec::IntoIter<String>,
    state: Arc<MockState>,
}

#[async_trait]
impl Generation for MockGeneration {
    type Token = String;

    async fn next_token(&mut self) -> Result<Option<String>> {
        match self.words.next() {
            Some(word) if word == "<fail>" => Err(Error::Inference("generation failed".into())),
            Some(word) => {
                self.state.tokens_generated.fetch_add(1, Ordering::SeqCst);
                Ok(Some(word))
            }
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}
