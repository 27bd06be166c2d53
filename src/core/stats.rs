//! Per-item-type statistics (spec §3) plus the ambient health-check surface
//! kept from the teacher's `core::stats::{HealthStatus, HealthCheck,
//! HealthCheckResult}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// Equi-depth histogram bucket for one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub histogram: Vec<HistogramBucket>,
    pub null_count: u64,
    /// HyperLogLog-style distinct-count sketch, stored as register bytes.
    pub distinct_sketch: Vec<u8>,
}

impl FieldStatistics {
    pub fn empty() -> Self {
        FieldStatistics { histogram: Vec::new(), null_count: 0, distinct_sketch: hll_new() }
    }

    pub fn observe_null(&mut self) {
        self.null_count += 1;
    }

    pub fn observe_distinct(&mut self, value_hash: u64) {
        hll_add(&mut self.distinct_sketch, value_hash);
    }

    pub fn estimated_distinct_count(&self) -> f64 {
        hll_estimate(&self.distinct_sketch)
    }
}

const HLL_REGISTERS: usize = 256;

fn hll_new() -> Vec<u8> {
    vec![0u8; HLL_REGISTERS]
}

fn hll_add(registers: &mut [u8], hash: u64) {
    let idx = (hash & (HLL_REGISTERS as u64 - 1)) as usize;
    let rest = hash >> 8;
    let rank = (rest.trailing_zeros() as u8 + 1).min(64);
    if registers[idx] < rank {
        registers[idx] = rank;
    }
}

fn hll_estimate(registers: &[u8]) -> f64 {
    let m = registers.len() as f64;
    let sum: f64 = registers.iter().map(|&r| 2f64.powi(-(r as i32))).sum();
    let alpha = 0.7213 / (1.0 + 1.079 / m);
    alpha * m * m / sum
}

/// Per-range size estimate, sourced from the KV engine's own estimates
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSizeEstimate {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub estimated_bytes: u64,
}

/// Per-item-type statistics cache (spec §3, §5 "per-store, mutex-guarded,
/// invalidated on writes exceeding a delta threshold").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub item_type: String,
    pub cardinality: u64,
    pub fields: HashMap<String, FieldStatistics>,
    pub range_estimates: Vec<RangeSizeEstimate>,
    /// Writes observed since the last full recompute.
    pub dirty_writes: u64,
}

impl Statistics {
    pub fn new(item_type: impl Into<String>) -> Self {
        Statistics {
            item_type: item_type.into(),
            cardinality: 0,
            fields: HashMap::new(),
            range_estimates: Vec::new(),
            dirty_writes: 0,
        }
    }

    /// Invalidation threshold: recompute is due once dirty writes exceed
    /// this fraction of the known cardinality.
    pub fn needs_recompute(&self, delta_threshold: f64) -> bool {
        if self.cardinality == 0 {
            return self.dirty_writes > 0;
        }
        (self.dirty_writes as f64 / self.cardinality as f64) > delta_threshold
    }

    pub fn record_write(&mut self) {
        self.dirty_writes += 1;
    }

    pub fn reset_dirty(&mut self) {
        self.dirty_writes = 0;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub latency_ms: u64,
}
