use std::path::{Path, PathBuf};
use std::time::Duration;
use async_trait::async_trait;
use stoker::backend::{Backend, BackendKind, Generation, HostProbe};
use stoker::{Error, Result};

/// A backend that echoes its input, tagged with the hardware it believes it runs on.
pub struct EchoBackend {
    kind: BackendKind,
    probe: HostProbe,
    model: Option<PathBuf>,
}

impl EchoBackend {
    pub fn new(kind: BackendKind, probe: HostProbe) -> Self {
        Self {
            kind,
            probe,
            model: None,
        }
    }

    fn model_name(&self) -> String {
        self.model
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Backend for EchoBackend {
    type Input = String;
    type Output = String;
    type Token = String;

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        match self.kind {
            BackendKind::Cpu => true,
            BackendKind::Cuda => self.probe.cuda_available(),
            BackendKind::Rocm => self.probe.rocm_available(),
        }
    }

    fn concurrent_safe(&self) -> bool {
        true
    }

    async fn load_model(&mut self, path: &Path) -> Result<()> {
        std::fs::metadata(path).map_err(|err| Error::model_load(path, err))?;
        self.model = Some(path.to_path_buf());
        Ok(())
    }

    async fn infer(&self, input: String) -> Result<String> {
        Ok(format!("[{}:{}] {}", self.kind, self.model_name(), input))
    }

    async fn batch_infer(&self, inputs: Vec<String>) -> Result<Vec<Result<String>>> {
        let size = inputs.len();
        Ok(inputs
            .into_iter()
            .map(|input| Ok(format!("[{}:{} batch of {size}] {input}", self.kind, self.model_name())))
            .collect())
    }

    async fn stream_infer(
        &self,
        input: String,
        _max_tokens: Option<usize>,
    ) -> Result<Box<dyn Generation<Token = String>>> {
        let words = input.split_whitespace().map(str::to_owned).collect::<Vec<_>>();
        Ok(Box::new(EchoGeneration { words: words.into_iter() }))
    }
}

struct EchoGeneration {
    words: std::vec::IntoIter<String>,
}

#[async_trait]
impl Generation for EchoGeneration {
    type Token = String;

    async fn next_token(&mut self) -> Result<Option<String>> {
        // pretend each token takes a little work
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(self.words.next())
    }

    fn release(&mut self) {
        tracing::debug!(remaining = self.words.len(), "generation released");
    }
}
