//! Memory readings for observability surfaces.
//!
//! Nothing here feeds back into backend selection or batching; the readings
//! exist so that health and status endpoints built around a dispatcher have
//! something to report.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use crate::backend::HostProbe;

const MIB: u64 = 1024 * 1024;

/// Host (CPU side) memory, in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMemory {
    pub total_mb: u64,
    pub used_mb: u64,
    pub available_mb: u64,
}

impl HostMemory {
    pub fn current() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            total_mb: system.total_memory() / MIB,
            used_mb: system.used_memory() / MIB,
            available_mb: system.available_memory() / MIB,
        }
    }
}

/// Memory of a single accelerator, in MiB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMemory {
    pub gpu_type: String,
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
}

/// Accelerator memory keyed by device identifier (`rocm:0`, `rocm:1`, ...).
///
/// The ordinal is the card's position among AMD GPUs, so a card without VRAM
/// counters leaves a gap rather than renumbering the cards after it.
///
/// AMD devices are read from the amdgpu sysfs counters. NVIDIA devices do not
/// expose VRAM usage through sysfs and are not reported.
pub fn device_memory(probe: &HostProbe) -> BTreeMap<String, DeviceMemory> {
    probe
        .amd_cards()
        .into_iter()
        .enumerate()
        .filter_map(|(ordinal, card)| {
            let memory = read_amdgpu_vram(&probe.drm_device_dir(card))?;
            Some((format!("rocm:{ordinal}"), memory))
        })
        .collect()
}

fn read_amdgpu_vram(device_dir: &Path) -> Option<DeviceMemory> {
    let read = |name: &str| -> Option<u64> {
        fs::read_to_string(device_dir.join(name)).ok()?.trim().parse().ok()
    };
    let total = read("mem_info_vram_total")?;
    let used = read("mem_info_vram_used")?;
    Some(DeviceMemory {
        gpu_type: "AMD".to_owned(),
        total_mb: total / MIB,
        used_mb: used / MIB,
        free_mb: total.saturating_sub(used) / MIB,
    })
}

/// Point-in-time view of host and accelerator memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub host: HostMemory,
    pub devices: BTreeMap<String, DeviceMemory>,
}

impl MemorySnapshot {
    pub fn capture(probe: &HostProbe) -> Self {
        Self {
            host: HostMemory::current(),
            devices: device_memory(probe),
        }
    }
}
