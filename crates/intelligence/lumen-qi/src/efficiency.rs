//! Efficiency Controller
//!
//! Reads a hardware snapshot and reacts to resource pressure:
//!
//! | Condition                            | Action                      |
//! |--------------------------------------|-----------------------------|
//! | CPU above `cpu_high`                 | scale complexity down (0.8) |
//! | CPU below `cpu_low`                  | scale complexity up (1.2)   |
//! | memory above `memory_high`           | short-term memory cleanup   |
//! | accelerator below `accelerator_idle` | migrate to accelerator      |
//!
//! Efficiency is the mean headroom across CPU, memory and (when present)
//! the accelerator, always in [0, 1].

use crate::config::EfficiencyThresholds;
use crate::hardware::HardwareSnapshot;
use crate::memory::BoundedMemoryStore;
use crate::service::Metrics;
use serde::{Deserialize, Serialize};

/// Receives workload reconfiguration signals
pub trait WorkloadSink: Send + Sync {
    fn scale_complexity(&self, factor: f64);
    fn migrate_to_accelerator(&self);
}

/// Sink that only logs the signals
#[derive(Debug, Default)]
pub struct TracingWorkloadSink;

impl WorkloadSink for TracingWorkloadSink {
    fn scale_complexity(&self, factor: f64) {
        tracing::info!("Scaling model complexity by {:.2}", factor);
    }

    fn migrate_to_accelerator(&self) {
        tracing::info!("Migrating workload to accelerator");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OptimizationAction {
    ScaleComplexity { factor: f64 },
    MemoryCleanup { evicted: usize },
    MigrateToAccelerator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub efficiency: f64,
    pub actions: Vec<OptimizationAction>,
}

pub struct EfficiencyController {
    thresholds: EfficiencyThresholds,
    sink: Box<dyn WorkloadSink>,
}

impl EfficiencyController {
    pub fn new(thresholds: EfficiencyThresholds, sink: Box<dyn WorkloadSink>) -> Self {
        Self { thresholds, sink }
    }

    pub fn with_thresholds(thresholds: EfficiencyThresholds) -> Self {
        Self::new(thresholds, Box::new(TracingWorkloadSink))
    }

    /// React to `snapshot` and write the new efficiency into `metrics`
    pub fn optimize(
        &self,
        snapshot: &HardwareSnapshot,
        metrics: &mut Metrics,
        memory: &mut BoundedMemoryStore,
    ) -> OptimizationReport {
        let t = &self.thresholds;
        let mut actions = Vec::new();

        if snapshot.cpu_percent > t.cpu_high {
            self.sink.scale_complexity(t.scale_down_factor);
            actions.push(OptimizationAction::ScaleComplexity {
                factor: t.scale_down_factor,
            });
        } else if snapshot.cpu_percent < t.cpu_low {
            self.sink.scale_complexity(t.scale_up_factor);
            actions.push(OptimizationAction::ScaleComplexity {
                factor: t.scale_up_factor,
            });
        }

        if snapshot.memory_percent > t.memory_high {
            let evicted = memory.cleanup();
            actions.push(OptimizationAction::MemoryCleanup { evicted });
        }

        if let Some(util) = snapshot.accelerator_utilization() {
            if util < t.accelerator_idle {
                self.sink.migrate_to_accelerator();
                actions.push(OptimizationAction::MigrateToAccelerator);
            }
        }

        let efficiency = Self::efficiency(snapshot);
        metrics.hardware_efficiency = efficiency;

        tracing::debug!(
            "Optimization complete: efficiency {:.3}, {} actions",
            efficiency,
            actions.len()
        );

        OptimizationReport {
            efficiency,
            actions,
        }
    }

    /// Mean headroom over the available resources
    pub fn efficiency(snapshot: &HardwareSnapshot) -> f64 {
        let headroom = |pct: f64| {
            if pct.is_finite() {
                (1.0 - pct / 100.0).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };

        let mut terms = vec![headroom(snapshot.cpu_percent), headroom(snapshot.memory_percent)];
        if let Some(util) = snapshot.accelerator_utilization() {
            terms.push(headroom(util));
        }

        terms.iter().sum::<f64>() / terms.len() as f64
    }
}
