//! Wire structs for the telemetry push contract.
//!
//! Field names serialize in camelCase to match what the control plane
//! ingests. A `Sample` is immutable once collected; the buffer moves it
//! around but never rewrites it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One collected health sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: String,
    pub node_id: String,
    pub region: String,
    pub role: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: SampleMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMetrics {
    pub load1m: f64,
    pub cpu_count: usize,
    pub memory_percent: f64,
    pub total_mem: u64,
    pub free_mem: u64,
    pub uptime: u64,
    pub platform: String,
}

/// Request body for `POST <endpoint>`: identity plus the batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload<'a> {
    pub node_id: &'a str,
    pub region: &'a str,
    pub role: &'a str,
    pub batch: &'a [Sample],
}
