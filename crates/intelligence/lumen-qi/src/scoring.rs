//! Interaction scoring
//!
//! Pluggable sentiment and engagement scorers. Both map an interaction to a
//! value in [0, 1].

use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("score {0} outside [0, 1]")]
    OutOfRange(f64),

    #[error("{scorer} scorer failed: {reason}")]
    Failed { scorer: String, reason: String },
}

pub trait SentimentScorer: Send + Sync {
    fn sentiment(&self, text: &str) -> Result<f64, ScoringError>;
}

pub trait EngagementScorer: Send + Sync {
    fn engagement(&self, text: &str) -> Result<f64, ScoringError>;
}

/// Word-list sentiment: share of positive words among all polar words.
/// Text with no polar words is neutral (0.5).
pub struct LexiconSentiment {
    positive: HashSet<String>,
    negative: HashSet<String>,
}

impl LexiconSentiment {
    pub fn new() -> Self {
        Self::with_words(
            &["love", "great", "awesome", "good", "excellent", "amazing"],
            &["hate", "bad", "terrible", "awful", "horrible", "worse"],
        )
    }

    pub fn with_words(positive: &[&str], negative: &[&str]) -> Self {
        Self {
            positive: positive.iter().map(|w| w.to_lowercase()).collect(),
            negative: negative.iter().map(|w| w.to_lowercase()).collect(),
        }
    }
}

impl Default for LexiconSentiment {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentScorer for LexiconSentiment {
    fn sentiment(&self, text: &str) -> Result<f64, ScoringError> {
        let mut positive = 0usize;
        let mut negative = 0usize;

        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| c.is_ascii_punctuation())
                .to_lowercase();
            if self.positive.contains(&word) {
                positive += 1;
            } else if self.negative.contains(&word) {
                negative += 1;
            }
        }

        if positive + negative == 0 {
            return Ok(0.5);
        }
        Ok(positive as f64 / (positive + negative) as f64)
    }
}

/// Length-proportional engagement, saturating at `scale` characters
pub struct LengthEngagement {
    scale: usize,
}

impl LengthEngagement {
    pub fn new(scale: usize) -> Self {
        Self { scale: scale.max(1) }
    }
}

impl Default for LengthEngagement {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EngagementScorer for LengthEngagement {
    fn engagement(&self, text: &str) -> Result<f64, ScoringError> {
        let chars = text.chars().count() as f64;
        Ok((chars / self.scale as f64).min(1.0))
    }
}
