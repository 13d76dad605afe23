//! Dispatcher configuration.
//!
//! Settings are layered with the `config` crate, later sources overriding
//! earlier ones:
//! 1. Built-in defaults
//! 2. A TOML file
//! 3. Environment variables prefixed with `STOKER_`, nested with `__`
//!
//! # Environment Variables
//!
//! - `STOKER_MODEL_PATH` - model to bind the backend to
//! - `STOKER_PREFER_GPU` - probe accelerators before falling back to the CPU
//! - `STOKER_INSTANCE_TYPE` - cloud instance type hint, e.g. `g4dn.xlarge`
//! - `STOKER_BATCHING__ENABLED` - route single inferences through the batch queue
//! - `STOKER_BATCHING__MAX_BATCH_SIZE`, `STOKER_BATCHING__BATCH_TIMEOUT_MS`,
//!   `STOKER_BATCHING__WORKERS`, `STOKER_BATCHING__QUEUE_CAPACITY`
//! - `STOKER_CACHE__CAPACITY` - enable the result cache with this many entries

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use crate::batching::BatchPolicy;
use crate::error::{Error, Result};

const ENV_PREFIX: &str = "STOKER";

/// Top level configuration of a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Model the selected backend is bound to
    pub model_path: PathBuf,

    /// Probe accelerators before settling for the CPU
    #[serde(default = "default_prefer_gpu")]
    pub prefer_gpu: bool,

    /// Advisory cloud instance type
    #[serde(default)]
    pub instance_type: Option<String>,

    /// Ask the instance metadata service for the instance type when none is configured
    #[serde(default)]
    pub detect_instance: bool,

    /// Upper bound on the metadata lookup
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,

    #[serde(default)]
    pub batching: BatchingConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub enabled: bool,
    pub max_batch_size: usize,
    pub batch_timeout_ms: u64,
    pub workers: usize,

    /// Unbounded when unset
    pub queue_capacity: Option<usize>,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_batch_size: 8,
            batch_timeout_ms: 100,
            workers: 1,
            queue_capacity: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disabled when unset
    pub capacity: Option<usize>,
}

fn default_prefer_gpu() -> bool {
    true
}

fn default_metadata_timeout_ms() -> u64 {
    1000
}

impl DispatcherConfig {
    /// A configuration with every setting at its default.
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            prefer_gpu: default_prefer_gpu(),
            instance_type: None,
            detect_instance: false,
            metadata_timeout_ms: default_metadata_timeout_ms(),
            batching: BatchingConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    pub fn prefer_gpu(mut self, prefer_gpu: bool) -> Self {
        self.prefer_gpu = prefer_gpu;
        self
    }

    pub fn instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = Some(instance_type.into());
        self
    }

    pub fn batching(mut self, batching: BatchingConfig) -> Self {
        self.batching = batching;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache.capacity = Some(capacity);
        self
    }

    /// Load from a TOML file, then apply `STOKER_*` environment overrides.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(environment(None));
        Self::build(builder)
    }

    /// Load from environment variables alone.
    pub fn from_env() -> Result<Self> {
        Self::build(Config::builder().add_source(environment(None)))
    }

    /// Parse a TOML document, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the dispatcher cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.model_path.as_os_str().is_empty() {
            return Err(Error::Config("model_path must not be empty".into()));
        }
        if self.batching.workers == 0 {
            return Err(Error::Config("batching.workers must be at least 1".into()));
        }
        if self.batching.queue_capacity == Some(0) {
            return Err(Error::Config("batching.queue_capacity must be at least 1".into()));
        }
        if self.cache.capacity == Some(0) {
            return Err(Error::Config("cache.capacity must be at least 1".into()));
        }
        self.batching
            .policy()
            .map_err(|err| Error::Config(err.to_string()))?;
        Ok(())
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub(crate) fn cache_capacity_nonzero(&self) -> Option<NonZeroUsize> {
        self.cache.capacity.and_then(NonZeroUsize::new)
    }
}

impl BatchingConfig {
    pub fn policy(&self) -> Result<BatchPolicy> {
        BatchPolicy::new(self.max_batch_size, Duration::from_millis(self.batch_timeout_ms))
    }
}

fn environment(source: Option<config::Map<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(source)
}
