//! Service configuration
//!
//! Every tunable the core uses is injected from here: thresholds, retention
//! window, optimization interval, personality defaults. Sources in order of
//! precedence (last wins): defaults, YAML file, environment.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the command channel binds to
    pub bind: String,
    /// Background optimization interval (seconds)
    pub optimize_interval_secs: u64,
    /// Pause after a channel fault before accepting again (milliseconds)
    pub channel_backoff_ms: u64,
    /// Depth of the inbound request queue
    pub request_queue: usize,
    pub personality: PersonalityConfig,
    pub evolution: EvolutionPolicy,
    pub efficiency: EfficiencyThresholds,
    pub memory: MemoryConfig,
    pub learners: LearnerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5555".to_string(),
            optimize_interval_secs: 60,
            channel_backoff_ms: 1000,
            request_queue: 64,
            personality: PersonalityConfig::default(),
            evolution: EvolutionPolicy::default(),
            efficiency: EfficiencyThresholds::default(),
            memory: MemoryConfig::default(),
            learners: LearnerConfig::default(),
        }
    }
}

/// Initial personality
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityConfig {
    pub name: String,
    pub traits: Vec<String>,
    pub learning_rate: f64,
    pub adaptation_threshold: f64,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            name: "Lumen QI".to_string(),
            traits: ["intuitive", "warm", "cosmic", "protective", "nurturing"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            learning_rate: 0.001,
            adaptation_threshold: 0.85,
        }
    }
}

/// Evolution thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionPolicy {
    /// Sentiment strictly above this appends the positive trait
    pub positive_sentiment: f64,
    /// Sentiment strictly below this appends the negative trait
    pub negative_sentiment: f64,
    pub positive_trait: String,
    pub negative_trait: String,
    /// Engagement strictly above this boosts the learning rate
    pub engagement_threshold: f64,
    pub learning_rate_boost: f64,
    /// Interaction length (chars) that maps to full engagement
    pub engagement_scale: usize,
}

impl Default for EvolutionPolicy {
    fn default() -> Self {
        Self {
            positive_sentiment: 0.7,
            negative_sentiment: 0.3,
            positive_trait: "empathetic".to_string(),
            negative_trait: "supportive".to_string(),
            engagement_threshold: 0.8,
            learning_rate_boost: 1.1,
            engagement_scale: 100,
        }
    }
}

/// Hardware pressure thresholds (percent) and complexity factors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EfficiencyThresholds {
    pub cpu_high: f64,
    pub cpu_low: f64,
    pub memory_high: f64,
    pub accelerator_idle: f64,
    pub scale_down_factor: f64,
    pub scale_up_factor: f64,
}

impl Default for EfficiencyThresholds {
    fn default() -> Self {
        Self {
            cpu_high: 80.0,
            cpu_low: 30.0,
            memory_high: 85.0,
            accelerator_idle: 50.0,
            scale_down_factor: 0.8,
            scale_up_factor: 1.2,
        }
    }
}

/// Memory tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Short-term retention window (seconds)
    pub retention_secs: u64,
    /// Importance at or above which a record is also kept long-term
    pub importance_threshold: f64,
    /// Short-term capacity, oldest dropped on overflow
    pub short_term_capacity: usize,
    /// Long-term capacity, oldest dropped on overflow
    pub long_term_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            importance_threshold: 0.7,
            short_term_capacity: 10_000,
            long_term_capacity: 10_000,
        }
    }
}

/// Reference learner set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub input_dim: usize,
    pub step_size: f64,
    pub momentum: f64,
    pub seed: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            input_dim: 100,
            step_size: 0.01,
            momentum: 0.9,
            seed: 42,
        }
    }
}

impl ServiceConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lumen")
            .join("config.yaml")
    }

    /// Load from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    /// Load from `path` (or the default location if it exists), then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `LUMEN_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("LUMEN_BIND") {
            self.bind = bind;
        }
        if let Some(secs) = std::env::var("LUMEN_OPTIMIZE_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.optimize_interval_secs = secs;
        }
        if let Some(secs) = std::env::var("LUMEN_RETENTION_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.memory.retention_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.personality.learning_rate > 0.0) {
            return Err(Error::Config("learning_rate must be positive".into()));
        }
        if !(self.evolution.learning_rate_boost > 0.0) {
            return Err(Error::Config("learning_rate_boost must be positive".into()));
        }
        if self.evolution.negative_sentiment > self.evolution.positive_sentiment {
            return Err(Error::Config(
                "negative_sentiment must not exceed positive_sentiment".into(),
            ));
        }
        if self.evolution.engagement_scale == 0 {
            return Err(Error::Config("engagement_scale must be non-zero".into()));
        }
        if self.optimize_interval_secs == 0 {
            return Err(Error::Config("optimize_interval_secs must be non-zero".into()));
        }
        if self.memory.retention_secs == 0 {
            return Err(Error::Config("retention_secs must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.memory.importance_threshold) {
            return Err(Error::Config("importance_threshold must be in [0, 1]".into()));
        }
        if self.efficiency.cpu_low > self.efficiency.cpu_high {
            return Err(Error::Config("cpu_low must not exceed cpu_high".into()));
        }
        for (name, value) in [
            ("cpu_high", self.efficiency.cpu_high),
            ("cpu_low", self.efficiency.cpu_low),
            ("memory_high", self.efficiency.memory_high),
            ("accelerator_idle", self.efficiency.accelerator_idle),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(Error::Config(format!("{} must be a percentage", name)));
            }
        }
        if self.memory.short_term_capacity == 0 || self.memory.long_term_capacity == 0 {
            return Err(Error::Config("memory capacities must be non-zero".into()));
        }
        if self.learners.input_dim == 0 {
            return Err(Error::Config("input_dim must be non-zero".into()));
        }
        if self.request_queue == 0 {
            return Err(Error::Config("request_queue must be non-zero".into()));
        }
        Ok(())
    }

    pub fn optimize_interval(&self) -> Duration {
        Duration::from_secs(self.optimize_interval_secs)
    }

    pub fn channel_backoff(&self) -> Duration {
        Duration::from_millis(self.channel_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind, "127.0.0.1:5555");
        assert_eq!(config.optimize_interval(), Duration::from_secs(60));
        assert_eq!(config.memory.retention_secs, 3600);
        assert_eq!(config.personality.traits.len(), 5);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "optimize_interval_secs: 5").unwrap();
        writeln!(file, "efficiency:").unwrap();
        writeln!(file, "  cpu_high: 90.0").unwrap();

        let config = ServiceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.optimize_interval_secs, 5);
        assert_eq!(config.efficiency.cpu_high, 90.0);
        assert_eq!(config.efficiency.cpu_low, 30.0);
        assert_eq!(config.personality.name, "Lumen QI");
    }

    #[test]
    fn test_rejects_non_positive_learning_rate() {
        let mut config = ServiceConfig::default();
        config.personality.learning_rate = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_inverted_cpu_thresholds() {
        let mut config = ServiceConfig::default();
        config.efficiency.cpu_low = 95.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_long_term_capacity() {
        let mut config = ServiceConfig::default();
        config.memory.long_term_capacity = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = ServiceConfig::default();
        config.optimize_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_yaml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "optimize_interval_secs: [not, a, number]").unwrap();
        assert!(matches!(
            ServiceConfig::from_file(file.path()),
            Err(Error::ConfigParse(_))
        ));
    }
}
