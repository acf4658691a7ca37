//! Personality Evolution
//!
//! Every interaction nudges the personality:
//!
//! ```text
//! interaction ──► sentiment ──┬─ > positive ──► + positive trait
//!            │                └─ < negative ──► + negative trait
//!            └──► engagement ──── > threshold ─► learning_rate × boost
//!
//! every call: evolution_cycles += 1
//! ```
//!
//! Traits only ever grow. Repeated traits are kept as-is; a trait appearing
//! several times records that the same signal was seen several times.

use crate::config::{EvolutionPolicy, PersonalityConfig};
use crate::scoring::{EngagementScorer, LengthEngagement, LexiconSentiment, ScoringError, SentimentScorer};
use serde::{Deserialize, Serialize};

/// The evolving personality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityState {
    pub name: String,
    pub traits: Vec<String>,
    pub learning_rate: f64,
    pub adaptation_threshold: f64,
    pub evolution_cycles: u64,
}

impl PersonalityState {
    pub fn from_config(config: &PersonalityConfig) -> Self {
        Self {
            name: config.name.clone(),
            traits: config.traits.clone(),
            learning_rate: config.learning_rate,
            adaptation_threshold: config.adaptation_threshold,
            evolution_cycles: 0,
        }
    }

    pub fn trait_count(&self, label: &str) -> usize {
        self.traits.iter().filter(|t| t.as_str() == label).count()
    }
}

impl Default for PersonalityState {
    fn default() -> Self {
        Self::from_config(&PersonalityConfig::default())
    }
}

/// What a single evolution step did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionOutcome {
    pub sentiment: f64,
    pub engagement: f64,
    pub trait_added: Option<String>,
    pub learning_rate_boosted: bool,
}

pub struct EvolutionEngine {
    sentiment: Box<dyn SentimentScorer>,
    engagement: Box<dyn EngagementScorer>,
    policy: EvolutionPolicy,
}

impl EvolutionEngine {
    pub fn new(
        sentiment: Box<dyn SentimentScorer>,
        engagement: Box<dyn EngagementScorer>,
        policy: EvolutionPolicy,
    ) -> Self {
        Self {
            sentiment,
            engagement,
            policy,
        }
    }

    /// Engine with the lexicon and length scorers
    pub fn with_policy(policy: EvolutionPolicy) -> Self {
        let engagement = LengthEngagement::new(policy.engagement_scale);
        Self::new(Box::new(LexiconSentiment::new()), Box::new(engagement), policy)
    }

    /// Score the interaction and apply the policy.
    ///
    /// The cycle counter advances even when a scorer fails; in that case no
    /// trait or learning-rate change is applied.
    pub fn evolve(
        &self,
        personality: &mut PersonalityState,
        interaction: &str,
    ) -> Result<EvolutionOutcome, ScoringError> {
        let scores = self.score(interaction);
        personality.evolution_cycles += 1;
        let (sentiment, engagement) = scores?;

        let trait_added = if sentiment > self.policy.positive_sentiment {
            Some(self.policy.positive_trait.clone())
        } else if sentiment < self.policy.negative_sentiment {
            Some(self.policy.negative_trait.clone())
        } else {
            None
        };
        if let Some(label) = &trait_added {
            personality.traits.push(label.clone());
        }

        let learning_rate_boosted = engagement > self.policy.engagement_threshold;
        if learning_rate_boosted {
            personality.learning_rate *= self.policy.learning_rate_boost;
        }

        tracing::info!(
            "Personality evolved - cycle {} (sentiment {:.2}, engagement {:.2})",
            personality.evolution_cycles,
            sentiment,
            engagement
        );

        Ok(EvolutionOutcome {
            sentiment,
            engagement,
            trait_added,
            learning_rate_boosted,
        })
    }

    fn score(&self, interaction: &str) -> Result<(f64, f64), ScoringError> {
        let sentiment = checked(self.sentiment.sentiment(interaction)?)?;
        let engagement = checked(self.engagement.engagement(interaction)?)?;
        Ok((sentiment, engagement))
    }
}

fn checked(score: f64) -> Result<f64, ScoringError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(ScoringError::OutOfRange(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    impl SentimentScorer for Fixed {
        fn sentiment(&self, _text: &str) -> Result<f64, ScoringError> {
            Ok(self.0)
        }
    }

    impl EngagementScorer for Fixed {
        fn engagement(&self, _text: &str) -> Result<f64, ScoringError> {
            Ok(self.0)
        }
    }

    struct Broken;

    impl SentimentScorer for Broken {
        fn sentiment(&self, _text: &str) -> Result<f64, ScoringError> {
            Err(ScoringError::Failed {
                scorer: "broken".into(),
                reason: "offline".into(),
            })
        }
    }

    fn engine(sentiment: f64, engagement: f64) -> EvolutionEngine {
        EvolutionEngine::new(
            Box::new(Fixed(sentiment)),
            Box::new(Fixed(engagement)),
            EvolutionPolicy::default(),
        )
    }

    #[test]
    fn test_positive_sentiment_adds_empathetic() {
        let mut p = PersonalityState::default();
        let outcome = engine(0.9, 0.1).evolve(&mut p, "x").unwrap();

        assert_eq!(outcome.trait_added.as_deref(), Some("empathetic"));
        assert_eq!(p.trait_count("empathetic"), 1);
        assert_eq!(p.trait_count("supportive"), 0);
        assert_eq!(p.evolution_cycles, 1);
    }

    #[test]
    fn test_negative_sentiment_adds_supportive() {
        let mut p = PersonalityState::default();
        engine(0.1, 0.1).evolve(&mut p, "x").unwrap();

        assert_eq!(p.trait_count("supportive"), 1);
        assert_eq!(p.trait_count("empathetic"), 0);
    }

    #[test]
    fn test_neutral_band_is_inclusive() {
        for s in [0.3, 0.5, 0.7] {
            let mut p = PersonalityState::default();
            let outcome = engine(s, 0.0).evolve(&mut p, "x").unwrap();
            assert!(outcome.trait_added.is_none(), "sentiment {}", s);
            assert_eq!(p.traits.len(), 5);
        }
    }

    #[test]
    fn test_traits_accumulate_duplicates() {
        let mut p = PersonalityState::default();
        let e = engine(1.0, 0.0);
        e.evolve(&mut p, "x").unwrap();
        e.evolve(&mut p, "x").unwrap();
        assert_eq!(p.trait_count("empathetic"), 2);
        assert_eq!(p.evolution_cycles, 2);
    }

    #[test]
    fn test_engagement_boosts_learning_rate() {
        let mut p = PersonalityState::default();
        let before = p.learning_rate;

        engine(0.5, 0.8).evolve(&mut p, "x").unwrap();
        assert_eq!(p.learning_rate, before);

        engine(0.5, 0.81).evolve(&mut p, "x").unwrap();
        assert!((p.learning_rate - before * 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_scorer_failure_still_counts_cycle() {
        let mut p = PersonalityState::default();
        let e = EvolutionEngine::new(
            Box::new(Broken),
            Box::new(Fixed(1.0)),
            EvolutionPolicy::default(),
        );

        let err = e.evolve(&mut p, "x").unwrap_err();
        assert!(matches!(err, ScoringError::Failed { .. }));
        assert_eq!(p.evolution_cycles, 1);
        assert_eq!(p.traits.len(), 5);
        assert_eq!(p.learning_rate, 0.001);
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let mut p = PersonalityState::default();
        let err = engine(1.5, 0.0).evolve(&mut p, "x").unwrap_err();
        assert_eq!(err, ScoringError::OutOfRange(1.5));
        assert_eq!(p.evolution_cycles, 1);
    }

    #[test]
    fn test_default_scorers_on_real_text() {
        let mut p = PersonalityState::default();
        let e = EvolutionEngine::with_policy(EvolutionPolicy::default());
        let outcome = e.evolve(&mut p, "I love this, it's amazing").unwrap();

        assert_eq!(outcome.sentiment, 1.0);
        assert!(p.traits.contains(&"empathetic".to_string()));
    }
}
