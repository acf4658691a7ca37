//! Bounded Memory Store
//!
//! Two retention tiers:
//! - short-term: every record, evicted once its age reaches the retention window
//! - long-term: records at or above the importance threshold, never time-evicted
//!
//! Both tiers are capacity-bounded and drop their oldest record on overflow.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

use crate::config::MemoryConfig;

/// A single remembered item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub payload: Value,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub short_term: usize,
    pub long_term: usize,
}

pub struct BoundedMemoryStore {
    short_term: VecDeque<MemoryRecord>,
    /// Grows with every important record until `long_term_capacity`
    long_term: VecDeque<MemoryRecord>,
    retention: ChronoDuration,
    importance_threshold: f64,
    capacity: usize,
    long_term_capacity: usize,
}

impl BoundedMemoryStore {
    pub fn new(retention: Duration, importance_threshold: f64, capacity: usize) -> Self {
        Self {
            short_term: VecDeque::new(),
            long_term: VecDeque::new(),
            retention: ChronoDuration::from_std(retention)
                .unwrap_or_else(|_| ChronoDuration::weeks(52 * 100)),
            importance_threshold,
            capacity: capacity.max(1),
            long_term_capacity: usize::MAX,
        }
    }

    pub fn with_long_term_capacity(mut self, capacity: usize) -> Self {
        self.long_term_capacity = capacity.max(1);
        self
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(
            Duration::from_secs(config.retention_secs),
            config.importance_threshold,
            config.short_term_capacity,
        )
        .with_long_term_capacity(config.long_term_capacity)
    }

    /// Record a payload now
    pub fn record(&mut self, payload: Value, importance: f64) -> Uuid {
        self.record_at(payload, importance, Utc::now())
    }

    /// Record a payload with an explicit capture time
    pub fn record_at(&mut self, payload: Value, importance: f64, at: DateTime<Utc>) -> Uuid {
        let record = MemoryRecord {
            id: Uuid::new_v4(),
            payload,
            importance: if importance.is_finite() { importance.clamp(0.0, 1.0) } else { 0.0 },
            created_at: at,
        };
        let id = record.id;

        if record.importance >= self.importance_threshold {
            self.long_term.push_back(record.clone());
            while self.long_term.len() > self.long_term_capacity {
                self.long_term.pop_front();
            }
        }

        self.short_term.push_back(record);
        while self.short_term.len() > self.capacity {
            self.short_term.pop_front();
        }

        id
    }

    /// Evict expired short-term records. Returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        self.cleanup_at(Utc::now())
    }

    /// Evict every short-term record whose age at `now` has reached the window
    pub fn cleanup_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.short_term.len();
        let retention = self.retention;
        self.short_term.retain(|r| now.signed_duration_since(r.created_at) < retention);
        let evicted = before - self.short_term.len();

        if evicted > 0 {
            tracing::debug!("Memory cleanup evicted {} short-term records", evicted);
        }
        evicted
    }

    pub fn short_term(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.short_term.iter()
    }

    pub fn long_term(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.long_term.iter()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            short_term: self.short_term.len(),
            long_term: self.long_term.len(),
        }
    }
}
