use crate::types::ResourceLimits;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// One reading of host resource usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSample {
    pub memory_used_mb: u64,
    pub cpu_percent: f32,
    pub sampled_at: DateTime<Utc>,
}

/// A resource reading that crossed its limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "lowercase")]
pub enum ThresholdBreach {
    Memory { used_mb: u64, limit_mb: u64 },
    Cpu { used_percent: f32, limit_percent: f32 },
}

/// Source of resource samples.
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// [`ResourceProbe`] backed by `sysinfo`.
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    /// Probe with a fresh `sysinfo` handle.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn sample(&self) -> ResourceSample {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu_usage();
        let cpus = system.cpus();
        let cpu_percent = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };
        ResourceSample {
            memory_used_mb: system.used_memory() / (1024 * 1024),
            cpu_percent,
            sampled_at: Utc::now(),
        }
    }
}

/// Compare a sample against a swarm's limits. Only ever reports; throttling
/// is left to whoever consumes the resulting events.
pub fn check_thresholds(sample: &ResourceSample, limits: &ResourceLimits) -> Vec<ThresholdBreach> {
    let mut breaches = Vec::new();
    if limits.max_memory_mb > 0 && sample.memory_used_mb > limits.max_memory_mb {
        breaches.push(ThresholdBreach::Memory {
            used_mb: sample.memory_used_mb,
            limit_mb: limits.max_memory_mb,
        });
    }
    if limits.max_cpu_percent > 0.0 && sample.cpu_percent > limits.max_cpu_percent {
        breaches.push(ThresholdBreach::Cpu {
            used_percent: sample.cpu_percent,
            limit_percent: limits.max_cpu_percent,
        });
    }
    breaches
}
