use std::fmt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::backend::{Backend, BackendFactory, BackendKind};
use crate::error::{Error, Result};
use super::{GpuProfile, InstanceHints};

/// Why a particular backend was bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// The caller did not ask for an accelerator
    CpuPreferred,
    /// An accelerator passed the live probe in the default probe order
    Detected,
    /// The accelerator family implied by the instance hint passed the live probe
    HintConfirmed,
    /// The instance hint named an accelerator that failed the live probe
    HintUnconfirmed,
    /// No accelerator passed the live probe
    Fallback,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SelectionReason::CpuPreferred => "cpu preferred",
            SelectionReason::Detected => "accelerator detected",
            SelectionReason::HintConfirmed => "instance hint confirmed",
            SelectionReason::HintUnconfirmed => "instance hint not confirmed by probe",
            SelectionReason::Fallback => "no accelerator available",
        };
        f.write_str(text)
    }
}

/// Immutable outcome of backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSelection {
    pub kind: BackendKind,
    pub reason: SelectionReason,
    pub instance_type: Option<String>,
    pub profile: Option<GpuProfile>,
}

/// Chooses, once, which backend a dispatcher binds to.
///
/// # Algorithm
///
/// * `prefer_gpu == false`: CPU, unconditionally
/// * a hint mapping to a CUDA or ROCm family: that family if it passes the
///   live probe, CPU otherwise
/// * otherwise ROCm, then CUDA, then CPU; the first to report available wins
#[derive(Debug, Clone, Default)]
pub struct BackendSelector {
    prefer_gpu: bool,
    hints: Option<InstanceHints>,
}

impl BackendSelector {
    pub fn new(prefer_gpu: bool) -> Self {
        Self { prefer_gpu, hints: None }
    }

    pub fn with_hints(mut self, hints: Option<InstanceHints>) -> Self {
        self.hints = hints;
        self
    }

    pub fn select<F>(&self, factory: &F) -> Result<(F::Backend, BackendSelection)>
    where
        F: BackendFactory + ?Sized,
    {
        let instance_type = self.hints.as_ref().map(|h| h.instance_type.clone());
        let profile = self.hints.as_ref().and_then(InstanceHints::gpu_profile);

        let selection = |kind, reason| BackendSelection {
            kind,
            reason,
            instance_type: instance_type.clone(),
            profile: profile.clone(),
        };

        if !self.prefer_gpu {
            let cpu = Self::cpu(factory)?;
            info!(backend = %BackendKind::Cpu, "using cpu backend (gpu not preferred)");
            return Ok((cpu, selection(BackendKind::Cpu, SelectionReason::CpuPreferred)));
        }

        if let Some(expected) = profile.as_ref().and_then(|p| p.family) {
            let backend = factory.create(expected);
            if backend.is_available() {
                info!(
                    backend = %expected,
                    instance_type = instance_type.as_deref().unwrap_or_default(),
                    "using accelerator implied by instance type"
                );
                return Ok((backend, selection(expected, SelectionReason::HintConfirmed)));
            }
            warn!(
                expected = %expected,
                instance_type = instance_type.as_deref().unwrap_or_default(),
                "instance type implies an accelerator but the probe failed, falling back to cpu"
            );
            let cpu = Self::cpu(factory)?;
            return Ok((cpu, selection(BackendKind::Cpu, SelectionReason::HintUnconfirmed)));
        }

        for kind in BackendKind::ACCELERATOR_PROBE_ORDER {
            let backend = factory.create(kind);
            if backend.is_available() {
                info!(backend = %kind, "accelerator detected");
                return Ok((backend, selection(kind, SelectionReason::Detected)));
            }
        }

        let cpu = Self::cpu(factory)?;
        info!(backend = %BackendKind::Cpu, "no accelerator available, using cpu backend");
        Ok((cpu, selection(BackendKind::Cpu, SelectionReason::Fallback)))
    }

    fn cpu<F>(factory: &F) -> Result<F::Backend>
    where
        F: BackendFactory + ?Sized,
    {
        let cpu = factory.create(BackendKind::Cpu);
        if cpu.is_available() {
            Ok(cpu)
        } else {
            Err(Error::BackendUnavailable)
        }
    }
}
