//! Error types shared by every stoker component.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by backend selection, the batch queue and the dispatcher.
///
/// The type is `Clone` because a single whole-batch failure is delivered to
/// every request that took part in that batch. Foreign error sources are held
/// behind an [`Arc`] for the same reason.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("no compute backend is available")]
    BackendUnavailable,

    #[error("failed to load model from {}: {source}", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    #[error("batch queue is closed")]
    QueueClosed,

    #[error("batch queue is full ({capacity} pending requests)")]
    QueueFull { capacity: usize },

    #[error("batch processing failed: {0}")]
    BatchProcessing(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("request was cancelled before it was batched")]
    Cancelled,

    #[error("request was dropped before a result was produced")]
    RequestDropped,

    #[error("batch produced {actual} results for {expected} inputs")]
    ResultCountMismatch { expected: usize, actual: usize },

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("invalid batch policy: {0}")]
    InvalidPolicy(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot derive cache key: {0}")]
    CacheKey(String),
}

impl Error {
    /// Wraps any error raised while loading model weights.
    pub fn model_load<E>(path: impl Into<PathBuf>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::ModelLoad {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// True for errors raised synchronously by `submit`.
    pub fn is_submission_error(&self) -> bool {
        matches!(self, Error::QueueClosed | Error::QueueFull { .. })
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_model_load_keeps_source() {
        let err = Error::model_load(
            "/models/llama",
            io::Error::new(io::ErrorKind::NotFound, "missing weights"),
        );
        assert_eq!(
            err.to_string(),
            "failed to load model from /models/llama: missing weights"
        );
        let source = std::error::Error::source(&err).expect("source is kept");
        assert_eq!(source.to_string(), "missing weights");
    }

    #[test]
    fn test_clone_shares_source() {
        let err = Error::model_load("m", io::Error::other("boom"));
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn test_submission_errors() {
        assert!(Error::QueueClosed.is_submission_error());
        assert!(Error::QueueFull { capacity: 4 }.is_submission_error());
        assert!(!Error::Cancelled.is_submission_error());
        assert_eq!(
            Error::QueueFull { capacity: 4 }.to_string(),
            "batch queue is full (4 pending requests)"
        );
    }
}
