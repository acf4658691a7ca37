//! Lumen QI Adaptive Service
//!
//! A long-running process that learns from feedback, evolves its personality
//! from interactions and tunes itself against host resource pressure:
//! - Feedback-driven adaptation across a set of pluggable learners
//! - Personality evolution from sentiment and engagement
//! - Hardware-aware efficiency control
//! - Short/long-term memory with time-based eviction
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ADAPTIVE SERVICE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   request ──► dispatcher ──┬──► LearnerSet          (adapt)             │
//! │                            ├──► EvolutionEngine     (evolve)            │
//! │                            └──► EfficiencyController (optimize)         │
//! │                                         │                               │
//! │   ticker ───────────────────────────────┤                               │
//! │                                         ▼                               │
//! │              ┌────────────────────────────────────────────┐             │
//! │              │ shared state (single Mutex)                 │             │
//! │              │ personality · metrics · memory              │             │
//! │              └────────────────────────────────────────────┘             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod efficiency;
pub mod evolve;
pub mod hardware;
pub mod learner;
pub mod memory;
pub mod protocol;
pub mod scoring;
pub mod server;
pub mod service;

pub use config::{
    EfficiencyThresholds, EvolutionPolicy, LearnerConfig, MemoryConfig, PersonalityConfig,
    ServiceConfig,
};
pub use efficiency::{
    EfficiencyController, OptimizationAction, OptimizationReport, TracingWorkloadSink,
    WorkloadSink,
};
pub use evolve::{EvolutionEngine, EvolutionOutcome, PersonalityState};
pub use hardware::{HardwareProbe, HardwareSnapshot, SysinfoProbe};
pub use learner::{
    AdaptOutcome, Learner, LearnerError, LearnerSet, LinearLearner, LogisticLearner,
    MomentumLearner,
};
pub use memory::{BoundedMemoryStore, MemoryRecord, MemoryStats};
pub use protocol::{Request, Response, StatusReport};
pub use scoring::{
    EngagementScorer, LengthEngagement, LexiconSentiment, ScoringError, SentimentScorer,
};
pub use server::{ChannelServer, ServiceLoop};
pub use service::{AdaptiveService, Metrics};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown command")]
    UnknownCommand(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Learner failed: {0}")]
    Learner(#[from] LearnerError),

    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
