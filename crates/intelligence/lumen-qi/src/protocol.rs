//! Wire protocol
//!
//! One JSON object per line in each direction.
//!
//! ```text
//! → {"command":"adapt","input_data":[0.1,0.2],"feedback":1.0}
//! ← {"success":true,"metrics":{...}}
//!
//! → {"command":"bogus"}
//! ← {"error":"Unknown command"}
//! ```

use crate::efficiency::OptimizationAction;
use crate::evolve::PersonalityState;
use crate::hardware::HardwareSnapshot;
use crate::memory::MemoryStats;
use crate::service::Metrics;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Status,
    Adapt { input_data: Vec<f64>, feedback: f64 },
    Evolve { interaction_data: String },
    Optimize,
}

impl Request {
    pub const COMMANDS: [&'static str; 4] = ["status", "adapt", "evolve", "optimize"];

    /// Parse one request line.
    ///
    /// An unrecognised or missing `command` is `UnknownCommand`; a known
    /// command with bad or missing fields is `InvalidRequest`.
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| Error::InvalidRequest(e.to_string()))?;

        if !value.is_object() {
            return Err(Error::InvalidRequest("request must be a JSON object".into()));
        }

        let label = match value.get("command") {
            Some(Value::String(label)) => label.clone(),
            Some(other) => return Err(Error::UnknownCommand(other.to_string())),
            None => return Err(Error::UnknownCommand(String::new())),
        };

        if !Self::COMMANDS.contains(&label.as_str()) {
            return Err(Error::UnknownCommand(label));
        }

        serde_json::from_value(value).map_err(|e| Error::InvalidRequest(e.to_string()))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Request::Status => "status",
            Request::Adapt { .. } => "adapt",
            Request::Evolve { .. } => "evolve",
            Request::Optimize => "optimize",
        }
    }
}

/// Everything `status` reports, captured in one critical section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub personality: PersonalityState,
    pub metrics: Metrics,
    /// `null` when the host could not be read
    pub hardware: Option<HardwareSnapshot>,
    pub memory: MemoryStats,
    pub timestamp: DateTime<Utc>,
}

/// Outbound reply
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Status(StatusReport),
    Adapt {
        success: bool,
        metrics: Metrics,
    },
    Evolve {
        success: bool,
        personality: PersonalityState,
    },
    Optimize {
        success: bool,
        efficiency: f64,
        actions: Vec<OptimizationAction>,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn from_error(err: &Error) -> Self {
        Response::Error {
            error: err.to_string(),
        }
    }

    /// Encode as a single JSON line (without the trailing newline)
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to encode response: {}", e);
            serde_json::json!({ "error": format!("Serialization error: {}", e) }).to_string()
        })
    }
}
