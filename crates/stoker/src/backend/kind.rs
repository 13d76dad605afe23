use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::Error;

/// The closed set of compute backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host CPU, always available and used as the universal fallback
    Cpu,
    /// NVIDIA-class accelerator
    Cuda,
    /// AMD-class accelerator
    Rocm,
}

impl BackendKind {
    /// Accelerators in the order they are probed when a GPU is preferred.
    ///
    /// ROCm is deliberately probed before CUDA. On a host where both report
    /// available this decides the winner, so do not reorder.
    pub const ACCELERATOR_PROBE_ORDER: [BackendKind; 2] = [BackendKind::Rocm, BackendKind::Cuda];

    pub fn is_accelerator(&self) -> bool {
        !matches!(self, BackendKind::Cpu)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Cpu => "cpu",
            BackendKind::Cuda => "cuda",
            BackendKind::Rocm => "rocm",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(BackendKind::Cpu),
            "cuda" | "nvidia" => Ok(BackendKind::Cuda),
            "rocm" | "hip" | "amd" => Ok(BackendKind::Rocm),
            other => Err(Error::Config(format!("unknown backend kind '{other}'"))),
        }
    }
}
