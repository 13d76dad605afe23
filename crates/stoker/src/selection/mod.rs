//! # Backend Selection
//!
//! Decides once, at dispatcher construction, which compute backend to bind.
//!
//! * [`BackendSelector`] - the selection algorithm, probing ROCm before CUDA
//! * [`InstanceHints`] / [`GpuProfile`] - advisory cloud-instance information
//! * [`BackendSelection`] - the immutable record of what was chosen and why
//!
//! With the `cloud-metadata` feature enabled, `detect_instance_hints` asks the
//! EC2 metadata service for the instance type under a bounded timeout.

mod hints;
mod selector;

#[cfg_attr(docsrs, doc(cfg(feature = "cloud-metadata")))]
#[cfg(feature = "cloud-metadata")]
mod metadata;

pub use hints::{GpuProfile, InstanceHints};
pub use selector::{BackendSelection, BackendSelector, SelectionReason};

#[cfg(feature = "cloud-metadata")]
pub use metadata::detect_instance_hints;
