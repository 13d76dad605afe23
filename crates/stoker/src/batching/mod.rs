//! # Dynamic Batching
//!
//! Turns independently arriving inference requests into bounded batches,
//! trading a little latency for backend throughput.
//!
//! ## Key Components
//!
//! * [`BatchQueue`] - the shared FIFO and its worker pool
//! * [`BatchPolicy`] - the size and wall-clock bounds of every batch
//! * [`BatchHandler`] - the function invoked once per assembled batch
//! * [`Pending`] - the future a caller awaits for its own result
//!
//! ## Assembly
//!
//! A worker waits, without a deadline, for the first request of a batch. From
//! that moment it keeps pulling for at most `batch_timeout`, dispatching early
//! once `max_batch_size` is reached. Empty batches are never dispatched.
//!
//! Requests whose caller dropped the [`Pending`] handle, or whose
//! cancellation token fired, are skipped when pulled and never reach the
//! handler.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use stoker::batching::{BatchPolicy, BatchQueue};
//! use stoker::Result;
//!
//! async fn double(inputs: Vec<u32>) -> Result<Vec<Result<u32>>> {
//!     Ok(inputs.into_iter().map(|i| Ok(i * 2)).collect())
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let policy = BatchPolicy::new(4, Duration::from_millis(5))?;
//! let queue = BatchQueue::new(policy)?;
//! queue.start(1, double)?;
//!
//! let pending = queue.submit(21)?;
//! assert_eq!(pending.await?, 42);
//!
//! queue.stop().await;
//! # Ok(())
//! # }
//! ```

mod batch;
mod handler;
mod queue;
mod request;
mod worker;

pub use batch::BatchPolicy;
pub use handler::BatchHandler;
pub use queue::BatchQueue;
pub use request::Pending;
