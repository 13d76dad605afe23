use serde::{Deserialize, Serialize};
use crate::backend::BackendKind;

/// Advisory information about the cloud instance the process runs on.
///
/// Hints only bias backend selection. They are never trusted without a live
/// availability probe, because instance metadata can be absent or stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHints {
    /// Instance type string, e.g. `p3.2xlarge`
    pub instance_type: String,
}

/// Expected accelerator capacity of a GPU instance type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuProfile {
    /// Accelerator family, `None` when the instance carries accelerators
    /// that are neither CUDA nor ROCm class (Inferentia, Trainium)
    pub family: Option<BackendKind>,
    pub gpu_type: String,
    pub gpu_count: u32,
    pub memory_gb: u32,
}

struct InstanceFamily {
    prefix: &'static str,
    family: Option<BackendKind>,
}

const fn nvidia(prefix: &'static str) -> InstanceFamily {
    InstanceFamily { prefix, family: Some(BackendKind::Cuda) }
}

const fn amd(prefix: &'static str) -> InstanceFamily {
    InstanceFamily { prefix, family: Some(BackendKind::Rocm) }
}

const fn other(prefix: &'static str) -> InstanceFamily {
    InstanceFamily { prefix, family: None }
}

const GPU_INSTANCE_FAMILIES: &[InstanceFamily] = &[
    nvidia("p3."),
    nvidia("p3dn."),
    nvidia("p4."),
    nvidia("p4d."),
    nvidia("p4de."),
    nvidia("p5."),
    nvidia("g3."),
    nvidia("g3s."),
    nvidia("g4."),
    nvidia("g4dn."),
    amd("g4ad."),
    nvidia("g5."),
    nvidia("g5g."),
    other("inf1."),
    other("trn1."),
    other("trn1n."),
];

// (instance type, gpu type, gpu count, memory in GB)
const KNOWN_INSTANCES: &[(&str, &str, u32, u32)] = &[
    ("p3.2xlarge", "Tesla V100", 1, 16),
    ("p3.8xlarge", "Tesla V100", 4, 64),
    ("p3.16xlarge", "Tesla V100", 8, 128),
    ("p3dn.24xlarge", "Tesla V100", 8, 256),
    ("p4d.24xlarge", "Tesla A100", 8, 320),
    ("p4de.24xlarge", "Tesla A100", 8, 640),
    ("p5.48xlarge", "H100", 8, 640),
    ("g4dn.xlarge", "Tesla T4", 1, 16),
    ("g4dn.2xlarge", "Tesla T4", 1, 16),
    ("g4dn.4xlarge", "Tesla T4", 1, 16),
    ("g4dn.8xlarge", "Tesla T4", 1, 16),
    ("g4dn.12xlarge", "Tesla T4", 4, 64),
    ("g4dn.16xlarge", "Tesla T4", 1, 16),
    ("g4ad.xlarge", "Radeon Pro V520", 1, 8),
    ("g4ad.2xlarge", "Radeon Pro V520", 1, 8),
    ("g4ad.4xlarge", "Radeon Pro V520", 1, 8),
    ("g4ad.8xlarge", "Radeon Pro V520", 2, 16),
    ("g4ad.16xlarge", "Radeon Pro V520", 4, 32),
    ("g5.xlarge", "A10G", 1, 24),
    ("g5.2xlarge", "A10G", 1, 24),
    ("g5.4xlarge", "A10G", 1, 24),
    ("g5.8xlarge", "A10G", 1, 24),
    ("g5.12xlarge", "A10G", 4, 96),
    ("g5.16xlarge", "A10G", 1, 24),
    ("g5.24xlarge", "A10G", 4, 96),
    ("g5.48xlarge", "A10G", 8, 192),
];

impl InstanceHints {
    pub fn new(instance_type: impl Into<String>) -> Self {
        Self {
            instance_type: instance_type.into().trim().to_owned(),
        }
    }

    /// True when the instance type belongs to a known accelerator family.
    pub fn is_gpu_instance(&self) -> bool {
        self.instance_family().is_some()
    }

    /// Expected accelerator profile for this instance type.
    ///
    /// Sizes missing from the catalog get a generic guess (one device,
    /// 16 GB) rather than no profile at all. Non-GPU instances yield `None`.
    pub fn gpu_profile(&self) -> Option<GpuProfile> {
        let family = self.instance_family()?;
        let known = KNOWN_INSTANCES
            .iter()
            .find(|(name, ..)| *name == self.instance_type);

        Some(match known {
            Some((_, gpu_type, gpu_count, memory_gb)) => GpuProfile {
                family: family.family,
                gpu_type: (*gpu_type).to_owned(),
                gpu_count: *gpu_count,
                memory_gb: *memory_gb,
            },
            None => GpuProfile {
                family: family.family,
                gpu_type: "Unknown".to_owned(),
                gpu_count: 1,
                memory_gb: 16,
            },
        })
    }

    fn instance_family(&self) -> Option<&'static InstanceFamily> {
        GPU_INSTANCE_FAMILIES
            .iter()
            .find(|family| self.instance_type.starts_with(family.prefix))
    }
}
