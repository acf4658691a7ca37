//! Learner Set
//!
//! Interchangeable online learners fed with (input, feedback) pairs. Each
//! learner reports the loss for the observation it just absorbed. The set
//! isolates failures: one learner erroring never stops its siblings.
//!
//! Reference engines:
//! - `LinearLearner`   squared error, plain SGD
//! - `LogisticLearner` sigmoid + binary cross-entropy, plain SGD
//! - `MomentumLearner` squared error, heavy-ball momentum

use crate::config::LearnerConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LearnerError {
    #[error("input has {got} features, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("input or feedback is not finite")]
    NonFinite,

    #[error("feedback {0} outside [0, 1]")]
    TargetOutOfRange(f64),

    #[error("loss diverged")]
    Diverged,

    #[error("engine error: {0}")]
    Engine(String),
}

/// A pluggable online learner
pub trait Learner: Send {
    fn name(&self) -> &str;

    /// Absorb one observation, returning its loss
    fn observe(&mut self, input: &[f64], feedback: f64) -> Result<f64, LearnerError>;
}

/// Result of feeding one observation to every learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<(String, LearnerError)>,
    /// Loss reported by the last learner that succeeded
    pub loss: Option<f64>,
}

impl AdaptOutcome {
    /// True unless every attempted learner failed
    pub fn success(&self) -> bool {
        self.attempted == 0 || self.succeeded > 0
    }
}

/// Fixed set of learner slots. Empty slots are skipped.
pub struct LearnerSet {
    slots: Vec<Option<Box<dyn Learner>>>,
}

impl LearnerSet {
    pub fn with_slots(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| None).collect(),
        }
    }

    /// Three reference engines, one per slot
    pub fn reference(config: &LearnerConfig) -> Self {
        let mut set = Self::with_slots(3);
        set.install(0, Box::new(LinearLearner::new(config.input_dim, config.step_size, config.seed)));
        set.install(1, Box::new(LogisticLearner::new(config.input_dim, config.step_size, config.seed + 1)));
        set.install(
            2,
            Box::new(MomentumLearner::new(
                config.input_dim,
                config.step_size,
                config.momentum,
                config.seed + 2,
            )),
        );
        set
    }

    /// Put a learner in a slot, returning whatever was there
    pub fn install(&mut self, slot: usize, learner: Box<dyn Learner>) -> Option<Box<dyn Learner>> {
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, || None);
        }
        self.slots[slot].replace(learner)
    }

    pub fn clear(&mut self, slot: usize) -> Option<Box<dyn Learner>> {
        self.slots.get_mut(slot).and_then(|s| s.take())
    }

    pub fn active(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn names(&self) -> Vec<String> {
        self.slots
            .iter()
            .flatten()
            .map(|l| l.name().to_string())
            .collect()
    }

    pub fn adapt_all(&mut self, input: &[f64], feedback: f64) -> AdaptOutcome {
        let mut outcome = AdaptOutcome {
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
            loss: None,
        };

        for learner in self.slots.iter_mut().flatten() {
            outcome.attempted += 1;
            match learner.observe(input, feedback) {
                Ok(loss) => {
                    outcome.succeeded += 1;
                    outcome.loss = Some(loss);
                }
                Err(e) => {
                    tracing::warn!("Learner {} failed: {}", learner.name(), e);
                    outcome.failures.push((learner.name().to_string(), e));
                }
            }
        }

        outcome
    }
}

// ============================================================================
// REFERENCE ENGINES
// ============================================================================

fn init_weights(dim: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..dim).map(|_| rng.gen_range(-0.05..0.05)).collect()
}

fn check_input(dim: usize, input: &[f64], feedback: f64) -> Result<(), LearnerError> {
    if input.len() != dim {
        return Err(LearnerError::DimensionMismatch {
            expected: dim,
            got: input.len(),
        });
    }
    if !feedback.is_finite() || input.iter().any(|x| !x.is_finite()) {
        return Err(LearnerError::NonFinite);
    }
    Ok(())
}

fn dot(weights: &[f64], input: &[f64]) -> f64 {
    weights.iter().zip(input).map(|(w, x)| w * x).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub struct LinearLearner {
    weights: Vec<f64>,
    bias: f64,
    step_size: f64,
}

impl LinearLearner {
    pub fn new(dim: usize, step_size: f64, seed: u64) -> Self {
        Self {
            weights: init_weights(dim, seed),
            bias: 0.0,
            step_size,
        }
    }

    pub fn predict(&self, input: &[f64]) -> f64 {
        dot(&self.weights, input) + self.bias
    }
}

impl Learner for LinearLearner {
    fn name(&self) -> &str {
        "linear"
    }

    fn observe(&mut self, input: &[f64], feedback: f64) -> Result<f64, LearnerError> {
        check_input(self.weights.len(), input, feedback)?;

        let error = self.predict(input) - feedback;
        let loss = error * error;
        if !loss.is_finite() {
            return Err(LearnerError::Diverged);
        }

        for (w, x) in self.weights.iter_mut().zip(input) {
            *w -= self.step_size * error * x;
        }
        self.bias -= self.step_size * error;

        Ok(loss)
    }
}

pub struct LogisticLearner {
    weights: Vec<f64>,
    bias: f64,
    step_size: f64,
}

impl LogisticLearner {
    pub fn new(dim: usize, step_size: f64, seed: u64) -> Self {
        Self {
            weights: init_weights(dim, seed),
            bias: 0.0,
            step_size,
        }
    }

    pub fn predict(&self, input: &[f64]) -> f64 {
        sigmoid(dot(&self.weights, input) + self.bias)
    }
}

impl Learner for LogisticLearner {
    fn name(&self) -> &str {
        "logistic"
    }

    fn observe(&mut self, input: &[f64], feedback: f64) -> Result<f64, LearnerError> {
        check_input(self.weights.len(), input, feedback)?;
        if !(0.0..=1.0).contains(&feedback) {
            return Err(LearnerError::TargetOutOfRange(feedback));
        }

        const EPS: f64 = 1e-7;
        let p = self.predict(input).clamp(EPS, 1.0 - EPS);
        let loss = -(feedback * p.ln() + (1.0 - feedback) * (1.0 - p).ln());
        if !loss.is_finite() {
            return Err(LearnerError::Diverged);
        }

        let gradient = p - feedback;
        for (w, x) in self.weights.iter_mut().zip(input) {
            *w -= self.step_size * gradient * x;
        }
        self.bias -= self.step_size * gradient;

        Ok(loss)
    }
}

pub struct MomentumLearner {
    weights: Vec<f64>,
    velocity: Vec<f64>,
    bias: f64,
    bias_velocity: f64,
    step_size: f64,
    momentum: f64,
}

impl MomentumLearner {
    pub fn new(dim: usize, step_size: f64, momentum: f64, seed: u64) -> Self {
        Self {
            weights: init_weights(dim, seed),
            velocity: vec![0.0; dim],
            bias: 0.0,
            bias_velocity: 0.0,
            step_size,
            momentum,
        }
    }

    pub fn predict(&self, input: &[f64]) -> f64 {
        dot(&self.weights, input) + self.bias
    }
}

impl Learner for MomentumLearner {
    fn name(&self) -> &str {
        "momentum"
    }

    fn observe(&mut self, input: &[f64], feedback: f64) -> Result<f64, LearnerError> {
        check_input(self.weights.len(), input, feedback)?;

        let error = self.predict(input) - feedback;
        let loss = error * error;
        if !loss.is_finite() {
            return Err(LearnerError::Diverged);
        }

        for ((w, v), x) in self.weights.iter_mut().zip(self.velocity.iter_mut()).zip(input) {
            *v = self.momentum * *v - self.step_size * error * x;
            *w += *v;
        }
        self.bias_velocity = self.momentum * self.bias_velocity - self.step_size * error;
        self.bias += self.bias_velocity;

        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Learner for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn observe(&mut self, _input: &[f64], _feedback: f64) -> Result<f64, LearnerError> {
            Err(LearnerError::Engine("device lost".into()))
        }
    }

    struct Constant(f64);

    impl Learner for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn observe(&mut self, _input: &[f64], _feedback: f64) -> Result<f64, LearnerError> {
            Ok(self.0)
        }
    }

    fn small_config() -> LearnerConfig {
        LearnerConfig {
            input_dim: 4,
            step_size: 0.1,
            momentum: 0.5,
            seed: 7,
        }
    }

    #[test]
    fn test_reference_set_has_three_learners() {
        let set = LearnerSet::reference(&small_config());
        assert_eq!(set.active(), 3);
        assert_eq!(set.names(), vec!["linear", "logistic", "momentum"]);
    }

    #[test]
    fn test_all_succeed() {
        let mut set = LearnerSet::reference(&small_config());
        let outcome = set.adapt_all(&[0.1, 0.2, 0.3, 0.4], 1.0);

        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.succeeded, 3);
        assert!(outcome.success());
        assert!(outcome.loss.unwrap().is_finite());
    }

    #[test]
    fn test_partial_failure_keeps_siblings_running() {
        let mut set = LearnerSet::with_slots(3);
        set.install(0, Box::new(Constant(0.25)));
        set.install(1, Box::new(Failing));
        set.install(2, Box::new(Constant(0.5)));

        let outcome = set.adapt_all(&[1.0], 1.0);
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "failing");
        assert_eq!(outcome.loss, Some(0.5));
        assert!(outcome.success());
    }

    #[test]
    fn test_loss_comes_from_last_success() {
        let mut set = LearnerSet::with_slots(2);
        set.install(0, Box::new(Constant(0.25)));
        set.install(1, Box::new(Failing));

        let outcome = set.adapt_all(&[1.0], 1.0);
        assert_eq!(outcome.loss, Some(0.25));
    }

    #[test]
    fn test_total_failure() {
        let mut set = LearnerSet::with_slots(2);
        set.install(0, Box::new(Failing));
        set.install(1, Box::new(Failing));

        let outcome = set.adapt_all(&[1.0], 1.0);
        assert!(!outcome.success());
        assert_eq!(outcome.loss, None);
    }

    #[test]
    fn test_empty_slots_are_skipped() {
        let mut set = LearnerSet::with_slots(3);
        set.install(1, Box::new(Constant(0.1)));

        let outcome = set.adapt_all(&[1.0], 0.0);
        assert_eq!(outcome.attempted, 1);
        assert!(outcome.success());

        set.clear(1);
        let outcome = set.adapt_all(&[1.0], 0.0);
        assert_eq!(outcome.attempted, 0);
        assert!(outcome.success());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut l = LinearLearner::new(4, 0.1, 1);
        assert_eq!(
            l.observe(&[1.0, 2.0], 1.0),
            Err(LearnerError::DimensionMismatch { expected: 4, got: 2 })
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut l = MomentumLearner::new(2, 0.1, 0.9, 1);
        assert_eq!(l.observe(&[f64::NAN, 1.0], 1.0), Err(LearnerError::NonFinite));
        assert_eq!(l.observe(&[1.0, 1.0], f64::INFINITY), Err(LearnerError::NonFinite));
    }

    #[test]
    fn test_logistic_rejects_non_probability_target() {
        let mut l = LogisticLearner::new(2, 0.1, 1);
        assert_eq!(l.observe(&[1.0, 1.0], 3.0), Err(LearnerError::TargetOutOfRange(3.0)));
    }

    #[test]
    fn test_linear_loss_decreases() {
        let mut l = LinearLearner::new(2, 0.1, 3);
        let input = [1.0, 0.5];
        let first = l.observe(&input, 2.0).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = l.observe(&input, 2.0).unwrap();
        }
        assert!(last < first);
    }

    #[test]
    fn test_logistic_loss_decreases() {
        let mut l = LogisticLearner::new(2, 0.5, 3);
        let input = [1.0, -1.0];
        let first = l.observe(&input, 1.0).unwrap();
        let mut last = first;
        for _ in 0..50 {
            last = l.observe(&input, 1.0).unwrap();
        }
        assert!(last < first);
        assert!(l.predict(&input) > 0.5);
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let a = LinearLearner::new(8, 0.1, 99);
        let b = LinearLearner::new(8, 0.1, 99);
        assert_eq!(a.weights, b.weights);
    }
}
