//! # Compute Backend
//!
//! This module defines the capability contract that wraps a model-execution
//! library running on one kind of hardware, allowing the batching and
//! dispatch layers to work in a backend-agnostic manner.
//!
//! ## Variants
//!
//! The set of backends is closed, see [`BackendKind`]:
//!
//! - `cpu`: always available, the universal fallback
//! - `cuda`: NVIDIA-class accelerators
//! - `rocm`: AMD-class accelerators
//!
//! ## Usage
//!
//! Users of this crate plug their model-execution code in by:
//!
//! 1. Implementing [`Backend`] (and [`Generation`] for streaming) for their runtime
//! 2. Reporting availability, typically through [`HostProbe`]
//! 3. Handing a [`BackendFactory`] to the dispatcher, which picks the variant once at startup
//!
//! Selection happens exactly once; nothing downstream branches on the chosen variant.

mod core_trait;
mod kind;
mod probe;

pub use core_trait::*;
pub use kind::BackendKind;
pub use probe::HostProbe;

#[cfg(test)]
pub(crate) use probe::fixtures;

#[cfg(test)]
/// Mock backend implementation.
///
/// Operates on plain strings and records every call
pub(crate) mod mock;
