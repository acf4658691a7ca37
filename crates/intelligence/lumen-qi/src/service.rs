//! Adaptive Service
//!
//! Owns every mutable aggregate behind a single lock and dispatches
//! commands against it. The background tick goes through the same lock, so
//! a command and a tick never observe each other half-done.

use crate::config::ServiceConfig;
use crate::efficiency::{EfficiencyController, OptimizationReport};
use crate::evolve::{EvolutionEngine, PersonalityState};
use crate::hardware::HardwareProbe;
use crate::learner::{AdaptOutcome, LearnerSet};
use crate::memory::{BoundedMemoryStore, MemoryStats};
use crate::protocol::{Request, Response, StatusReport};
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Performance counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub loss: f64,
    pub learning_iterations: u64,
    pub evolution_score: f64,
    /// Always in [0, 1]
    pub hardware_efficiency: f64,
}

struct ServiceState {
    personality: PersonalityState,
    metrics: Metrics,
    memory: BoundedMemoryStore,
    learners: LearnerSet,
}

pub struct AdaptiveService {
    state: Mutex<ServiceState>,
    evolution: EvolutionEngine,
    efficiency: EfficiencyController,
    probe: Box<dyn HardwareProbe>,
}

impl AdaptiveService {
    /// Service with the reference learners, scorers and a logging sink
    pub fn new(config: &ServiceConfig, probe: Box<dyn HardwareProbe>) -> Self {
        Self {
            state: Mutex::new(ServiceState {
                personality: PersonalityState::from_config(&config.personality),
                metrics: Metrics::default(),
                memory: BoundedMemoryStore::from_config(&config.memory),
                learners: LearnerSet::reference(&config.learners),
            }),
            evolution: EvolutionEngine::with_policy(config.evolution.clone()),
            efficiency: EfficiencyController::with_thresholds(config.efficiency.clone()),
            probe,
        }
    }

    pub fn with_learners(mut self, learners: LearnerSet) -> Self {
        self.state_mut().learners = learners;
        self
    }

    pub fn with_evolution(mut self, evolution: EvolutionEngine) -> Self {
        self.evolution = evolution;
        self
    }

    pub fn with_efficiency(mut self, efficiency: EfficiencyController) -> Self {
        self.efficiency = efficiency;
        self
    }

    // Poison is recovered: every aggregate is left consistent between writes.
    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state_mut(&mut self) -> &mut ServiceState {
        self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    pub fn handle(&self, request: Request) -> Result<Response> {
        tracing::debug!("Handling {}", request.label());

        match request {
            Request::Status => Ok(Response::Status(self.status())),
            Request::Adapt {
                input_data,
                feedback,
            } => {
                let (outcome, metrics) = self.adapt(&input_data, feedback);
                Ok(Response::Adapt {
                    success: outcome.success(),
                    metrics,
                })
            }
            Request::Evolve { interaction_data } => {
                let personality = self.evolve(&interaction_data)?;
                Ok(Response::Evolve {
                    success: true,
                    personality,
                })
            }
            Request::Optimize => {
                let report = self.optimize()?;
                Ok(Response::Optimize {
                    success: true,
                    efficiency: report.efficiency,
                    actions: report.actions,
                })
            }
        }
    }

    /// Parse, dispatch and encode one request line. Never fails: errors
    /// become `{"error": ...}` replies.
    pub fn handle_json(&self, line: &str) -> String {
        let response = match Request::parse(line).and_then(|req| self.handle(req)) {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    Error::UnknownCommand(label) => tracing::warn!("Unknown command: {:?}", label),
                    other => tracing::warn!("Request failed: {}", other),
                }
                Response::from_error(&e)
            }
        };
        response.encode()
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    /// Current aggregates plus a fresh hardware reading
    pub fn status(&self) -> StatusReport {
        let hardware = match self.probe.snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("Status without hardware: {}", e);
                None
            }
        };

        let state = self.lock();
        StatusReport {
            personality: state.personality.clone(),
            metrics: state.metrics.clone(),
            hardware,
            memory: state.memory.stats(),
            timestamp: Utc::now(),
        }
    }

    /// Feed one observation to every learner. The iteration counter advances
    /// exactly once, whatever the learners did.
    pub fn adapt(&self, input: &[f64], feedback: f64) -> (AdaptOutcome, Metrics) {
        let mut state = self.lock();
        let outcome = state.learners.adapt_all(input, feedback);

        state.metrics.learning_iterations += 1;
        if let Some(loss) = outcome.loss {
            state.metrics.loss = loss;
        }

        tracing::debug!(
            "Adapt iteration {}: {}/{} learners succeeded",
            state.metrics.learning_iterations,
            outcome.succeeded,
            outcome.attempted
        );

        let metrics = state.metrics.clone();
        (outcome, metrics)
    }

    /// Evolve the personality and remember the interaction
    pub fn evolve(&self, interaction: &str) -> Result<PersonalityState> {
        let mut state = self.lock();
        let outcome = self.evolution.evolve(&mut state.personality, interaction)?;

        state.memory.record(
            serde_json::json!({
                "interaction": interaction,
                "sentiment": outcome.sentiment,
            }),
            outcome.engagement,
        );

        Ok(state.personality.clone())
    }

    /// Read the host and let the controller react. A failed read leaves the
    /// previous efficiency in place.
    pub fn optimize(&self) -> Result<OptimizationReport> {
        let snapshot = self.probe.snapshot()?;

        let mut state = self.lock();
        let ServiceState {
            metrics, memory, ..
        } = &mut *state;
        Ok(self.efficiency.optimize(&snapshot, metrics, memory))
    }

    /// Periodic maintenance: memory cleanup, then optimization. Failures are
    /// logged only.
    pub fn background_tick(&self) -> Option<OptimizationReport> {
        let evicted = self.lock().memory.cleanup();
        if evicted > 0 {
            tracing::debug!("Background cleanup evicted {} records", evicted);
        }

        match self.optimize() {
            Ok(report) => {
                tracing::debug!("Background optimization: efficiency {:.3}", report.efficiency);
                Some(report)
            }
            Err(e) => {
                tracing::warn!("Background optimization failed: {}", e);
                None
            }
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn metrics(&self) -> Metrics {
        self.lock().metrics.clone()
    }

    pub fn personality(&self) -> PersonalityState {
        self.lock().personality.clone()
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.lock().memory.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::HardwareSnapshot;
    use crate::learner::{Learner, LearnerError};
    use serde_json::Value;

    struct FixedProbe(Option<HardwareSnapshot>);

    impl HardwareProbe for FixedProbe {
        fn snapshot(&self) -> Result<HardwareSnapshot> {
            self.0
                .clone()
                .ok_or_else(|| Error::HardwareUnavailable("no sensors".into()))
        }
    }

    struct Failing;

    impl Learner for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn observe(&mut self, _input: &[f64], _feedback: f64) -> std::result::Result<f64, LearnerError> {
            Err(LearnerError::Engine("boom".into()))
        }
    }

    fn service(snapshot: Option<HardwareSnapshot>) -> AdaptiveService {
        AdaptiveService::new(&ServiceConfig::default(), Box::new(FixedProbe(snapshot)))
    }

    #[test]
    fn test_initial_status() {
        let svc = service(Some(HardwareSnapshot::from_percentages(20.0, 30.0)));
        let status = svc.status();

        assert_eq!(status.personality.traits.len(), 5);
        assert_eq!(status.personality.evolution_cycles, 0);
        assert_eq!(status.metrics.learning_iterations, 0);
        assert!(status.hardware.is_some());
        assert_eq!(status.memory, MemoryStats { short_term: 0, long_term: 0 });
    }

    #[test]
    fn test_status_without_hardware() {
        let svc = service(None);
        let reply: Value = serde_json::from_str(&svc.handle_json(r#"{"command":"status"}"#)).unwrap();
        assert!(reply["hardware"].is_null());
        assert_eq!(reply["personality"]["name"], "Lumen QI");
    }

    #[test]
    fn test_adapt_with_reference_learners() {
        let svc = service(None);
        let input = vec![0.01; 100];
        let (outcome, metrics) = svc.adapt(&input, 0.5);

        assert_eq!(outcome.attempted, 3);
        assert!(outcome.success());
        assert_eq!(metrics.learning_iterations, 1);
        assert_eq!(Some(metrics.loss), outcome.loss);
    }

    #[test]
    fn test_adapt_counts_when_every_learner_fails() {
        let mut learners = LearnerSet::with_slots(2);
        learners.install(0, Box::new(Failing));
        learners.install(1, Box::new(Failing));
        let svc = service(None).with_learners(learners);

        let (outcome, metrics) = svc.adapt(&[1.0], 1.0);
        assert!(!outcome.success());
        assert_eq!(metrics.learning_iterations, 1);
        assert_eq!(metrics.loss, 0.0);

        let reply: Value = serde_json::from_str(
            &svc.handle_json(r#"{"command":"adapt","input_data":[1.0],"feedback":1.0}"#),
        )
        .unwrap();
        assert_eq!(reply["success"], false);
        assert_eq!(reply["metrics"]["learning_iterations"], 2);
    }

    #[test]
    fn test_adapt_keeps_loss_when_all_fail() {
        let svc = service(None);
        svc.adapt(&vec![0.01; 100], 0.5);
        let before = svc.metrics().loss;

        // Wrong dimension: every reference learner rejects it
        let (outcome, metrics) = svc.adapt(&[1.0, 2.0], 0.5);
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(metrics.loss, before);
        assert_eq!(metrics.learning_iterations, 2);
    }

    #[test]
    fn test_evolve_records_memory() {
        let svc = service(None);
        let text = "x".repeat(90) + " love";
        let personality = svc.evolve(&text).unwrap();

        assert_eq!(personality.evolution_cycles, 1);
        assert_eq!(personality.trait_count("empathetic"), 1);
        // 95 chars of engagement clears both the boost and long-term gates
        assert!(personality.learning_rate > 0.001);
        assert_eq!(svc.memory_stats(), MemoryStats { short_term: 1, long_term: 1 });
    }

    #[test]
    fn test_optimize_updates_efficiency() {
        let svc = service(Some(HardwareSnapshot::from_percentages(90.0, 40.0)));
        let report = svc.optimize().unwrap();
        assert!((report.efficiency - 0.35).abs() < 1e-9);
        assert!((svc.metrics().hardware_efficiency - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_optimize_failure_keeps_efficiency() {
        let svc = service(None);
        assert!(matches!(svc.optimize(), Err(Error::HardwareUnavailable(_))));
        assert_eq!(svc.metrics().hardware_efficiency, 0.0);

        let reply = svc.handle_json(r#"{"command":"optimize"}"#);
        assert_eq!(reply, r#"{"error":"Hardware unavailable: no sensors"}"#);
    }

    #[test]
    fn test_background_tick_swallows_errors() {
        assert!(service(None).background_tick().is_none());

        let svc = service(Some(HardwareSnapshot::from_percentages(50.0, 50.0)));
        let report = svc.background_tick().unwrap();
        assert_eq!(report.efficiency, 0.5);
    }

    #[test]
    fn test_invalid_request_leaves_state() {
        let svc = service(None);
        let reply: Value =
            serde_json::from_str(&svc.handle_json(r#"{"command":"adapt","feedback":1.0}"#)).unwrap();
        assert!(reply["error"].as_str().unwrap().starts_with("Invalid request"));
        assert_eq!(svc.metrics(), Metrics::default());
    }
}
