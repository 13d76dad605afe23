//! Live hardware probing for accelerator backends.
//!
//! These checks only look at what the kernel drivers expose under `/proc`,
//! `/dev` and `/sys`, so they are cheap and side-effect free. Backend
//! implementations call them from [`Backend::is_available`](super::Backend::is_available).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// PCI vendor id reported by AMD GPUs.
const AMD_PCI_VENDOR: &str = "0x1002";

#[derive(Debug, Clone)]
pub struct HostProbe {
    root: PathBuf,
    cuda_visible_devices: Option<String>,
    hip_visible_devices: Option<String>,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe {
    /// Probe the running host, honoring `CUDA_VISIBLE_DEVICES` and
    /// `HIP_VISIBLE_DEVICES`/`ROCR_VISIBLE_DEVICES`.
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
            cuda_visible_devices: env::var("CUDA_VISIBLE_DEVICES").ok(),
            hip_visible_devices: env::var("HIP_VISIBLE_DEVICES")
                .or_else(|_| env::var("ROCR_VISIBLE_DEVICES"))
                .ok(),
        }
    }

    /// Probe a filesystem tree rooted at `root` and ignore device masks.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cuda_visible_devices: None,
            hip_visible_devices: None,
        }
    }

    pub fn cuda_visible_devices(mut self, mask: Option<String>) -> Self {
        self.cuda_visible_devices = mask;
        self
    }

    pub fn hip_visible_devices(mut self, mask: Option<String>) -> Self {
        self.hip_visible_devices = mask;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when the NVIDIA kernel driver is loaded and devices are not masked out.
    pub fn cuda_available(&self) -> bool {
        if masks_all_devices(self.cuda_visible_devices.as_deref()) {
            debug!("cuda devices hidden by CUDA_VISIBLE_DEVICES");
            return false;
        }
        self.root.join("proc/driver/nvidia/version").exists()
            || self.root.join("dev/nvidia0").exists()
    }

    /// True when the amdkfd compute interface exists and at least one AMD GPU is present.
    pub fn rocm_available(&self) -> bool {
        if masks_all_devices(self.hip_visible_devices.as_deref()) {
            debug!("rocm devices hidden by HIP_VISIBLE_DEVICES");
            return false;
        }
        self.root.join("dev/kfd").exists() && !self.amd_cards().is_empty()
    }

    /// Indices of DRM cards whose PCI vendor is AMD, sorted ascending.
    pub fn amd_cards(&self) -> Vec<u32> {
        let drm = self.root.join("sys/class/drm");
        let Ok(entries) = fs::read_dir(&drm) else {
            return vec![];
        };

        let mut cards: Vec<u32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let index = name.to_str()?.strip_prefix("card")?.parse::<u32>().ok()?;
                let vendor = fs::read_to_string(entry.path().join("device/vendor")).ok()?;
                (vendor.trim() == AMD_PCI_VENDOR).then_some(index)
            })
            .collect();
        cards.sort_unstable();
        cards
    }

    /// Sysfs device directory for DRM card `index`.
    pub(crate) fn drm_device_dir(&self, index: u32) -> PathBuf {
        self.root.join(format!("sys/class/drm/card{index}/device"))
    }
}

fn masks_all_devices(mask: Option<&str>) -> bool {
    matches!(mask.map(str::trim), Some("") | Some("-1"))
}
