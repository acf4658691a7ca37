//! Hardware Snapshots
//!
//! Point-in-time readings of host resource pressure:
//! - CPU utilization, core count, frequency (sysinfo)
//! - Memory utilization and absolute figures (sysinfo)
//! - Accelerator utilization and memory (nvidia-smi, when present)
//!
//! Snapshots are immutable and recreated on every query.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::sync::Mutex;
use sysinfo::System;

/// Immutable hardware reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub cpu_percent: f64,
    pub cpu_count: usize,
    pub cpu_freq_mhz: Option<u64>,
    pub memory_percent: f64,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub memory_available_bytes: u64,
    /// An accelerator was detected on this host
    pub accelerator_available: bool,
    /// Live accelerator reading, if one could be taken
    pub accelerator: Option<AcceleratorReading>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorReading {
    pub model: String,
    pub utilization_percent: f64,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
}

impl HardwareSnapshot {
    /// Snapshot with only utilization figures set. Absolute figures are zero.
    pub fn from_percentages(cpu_percent: f64, memory_percent: f64) -> Self {
        Self {
            cpu_percent,
            cpu_count: 0,
            cpu_freq_mhz: None,
            memory_percent,
            memory_total_bytes: 0,
            memory_used_bytes: 0,
            memory_available_bytes: 0,
            accelerator_available: false,
            accelerator: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_accelerator(mut self, utilization_percent: f64) -> Self {
        self.accelerator_available = true;
        self.accelerator = Some(AcceleratorReading {
            model: "unknown".to_string(),
            utilization_percent,
            memory_used_mb: 0,
            memory_total_mb: 0,
        });
        self
    }

    /// Accelerator utilization, only when one is present and readable
    pub fn accelerator_utilization(&self) -> Option<f64> {
        if !self.accelerator_available {
            return None;
        }
        self.accelerator.as_ref().map(|a| a.utilization_percent)
    }
}

/// Source of hardware snapshots
pub trait HardwareProbe: Send + Sync {
    fn snapshot(&self) -> Result<HardwareSnapshot>;
}

/// Probe backed by `sysinfo` and `nvidia-smi`
pub struct SysinfoProbe {
    system: Mutex<System>,
    accelerator_detected: bool,
}

impl SysinfoProbe {
    /// Create a probe and prime CPU usage so the first snapshot has a delta
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);

        let accelerator_detected = query_nvidia_smi().is_some();
        if accelerator_detected {
            tracing::info!("Accelerator detected via nvidia-smi");
        }

        Self {
            system: Mutex::new(system),
            accelerator_detected,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareProbe for SysinfoProbe {
    fn snapshot(&self) -> Result<HardwareSnapshot> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(Error::HardwareUnavailable(
                "platform not supported by sysinfo".into(),
            ));
        }

        let mut system = self
            .system
            .lock()
            .map_err(|_| Error::HardwareUnavailable("probe lock poisoned".into()))?;

        system.refresh_cpu_usage();
        system.refresh_cpu_frequency();
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(Error::HardwareUnavailable("memory totals unreadable".into()));
        }
        let used = system.used_memory();
        let available = system.available_memory();

        let cpus = system.cpus();
        let cpu_freq_mhz = cpus.first().map(|c| c.frequency()).filter(|f| *f > 0);

        let accelerator = if self.accelerator_detected {
            query_nvidia_smi()
        } else {
            None
        };

        Ok(HardwareSnapshot {
            cpu_percent: system.global_cpu_usage() as f64,
            cpu_count: cpus.len(),
            cpu_freq_mhz,
            memory_percent: memory_pressure(total, available),
            memory_total_bytes: total,
            memory_used_bytes: used,
            memory_available_bytes: available,
            accelerator_available: self.accelerator_detected,
            accelerator,
            timestamp: Utc::now(),
        })
    }
}

/// Share of memory not available to new allocations, in percent
fn memory_pressure(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    total.saturating_sub(available) as f64 / total as f64 * 100.0
}

fn query_nvidia_smi() -> Option<AcceleratorReading> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=name,utilization.gpu,memory.used,memory.total",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
}

/// Parse the first GPU line of `nvidia-smi` CSV output
fn parse_nvidia_smi(stdout: &str) -> Option<AcceleratorReading> {
    let line = stdout.lines().find(|l| !l.trim().is_empty())?;
    let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();

    if parts.len() < 4 {
        return None;
    }

    Some(AcceleratorReading {
        model: parts[0].to_string(),
        utilization_percent: parts[1].parse().ok()?,
        memory_used_mb: parts[2].parse().unwrap_or(0),
        memory_total_mb: parts[3].parse().unwrap_or(0),
    })
}
