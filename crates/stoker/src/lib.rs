//! # Stoker
//!
//! Batched inference dispatch over CPU, CUDA and ROCm compute backends.
//!
//! ## Overview
//!
//! Stoker sits between callers and a model-execution library. It does not
//! run models itself; it decides which hardware backend to bind to and keeps
//! that backend busy by grouping concurrent requests into bounded batches.
//!
//! Key components include:
//!
//! - A backend capability contract implemented by model-execution code
//! - One-shot backend selection with a deterministic fallback to the CPU
//! - A dynamic batching queue drained by a pool of workers
//! - A dispatcher façade exposing single, batched and streaming inference
//!
//! ## Architecture
//!
//! ### Backend Traits
//!
//! The [`backend::Backend`] trait is the only thing a model runtime has to
//! implement. Inputs, outputs and tokens are associated types; the crate
//! never looks inside them.
//!
//! ### Selection
//!
//! [`selection::BackendSelector`] runs once per dispatcher. With GPUs
//! preferred it probes ROCm before CUDA and falls back to the CPU. Cloud
//! instance hints can point it at a family directly, but a live probe must
//! still confirm the hardware.
//!
//! ### Batching
//!
//! [`batching::BatchQueue`] collects requests until either `max_batch_size`
//! requests are waiting or `batch_timeout` has elapsed since the first one,
//! then hands the batch to the backend in a single call.
//!
//! ## Features
//!
//! - **cloud-metadata** - query the EC2 instance metadata service for instance hints
//!
//! ## Example
//!
//! ```rust
//! use std::path::Path;
//! use async_trait::async_trait;
//! use stoker::backend::{Backend, BackendKind, Generation};
//! use stoker::{Dispatcher, DispatcherConfig, Result};
//!
//! struct Upper {
//!     kind: BackendKind,
//! }
//!
//! #[async_trait]
//! impl Backend for Upper {
//!     type Input = String;
//!     type Output = String;
//!     type Token = String;
//!
//!     fn kind(&self) -> BackendKind {
//!         self.kind
//!     }
//!
//!     fn is_available(&self) -> bool {
//!         self.kind == BackendKind::Cpu
//!     }
//!
//!     async fn load_model(&mut self, _path: &Path) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn infer(&self, input: String) -> Result<String> {
//!         Ok(input.to_uppercase())
//!     }
//!
//!     async fn stream_infer(
//!         &self,
//!         _input: String,
//!         _max_tokens: Option<usize>,
//!     ) -> Result<Box<dyn Generation<Token = String>>> {
//!         unimplemented!()
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let dispatcher = Dispatcher::new(
//!     |kind: BackendKind| Upper { kind },
//!     DispatcherConfig::new("weights.bin"),
//! )
//! .await?;
//!
//! assert_eq!(dispatcher.selection().kind, BackendKind::Cpu);
//! assert_eq!(dispatcher.infer("hi".to_owned()).await?, "HI");
//! # Ok(())
//! # }
//! ```

mod cache;
mod dispatcher;
mod error;
mod stream;

pub mod backend;
pub mod batching;
pub mod config;
pub mod selection;
pub mod telemetry;

pub use cache::{CacheStats, ResultCache};
pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DispatcherInfo};
pub use error::{Error, Result};
pub use stream::TokenStream;
