use serde::{Deserialize, Serialize};

// Schéma du wire : camelCase côté JSON, comme les sondes l'émettent.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRequest {
    pub node_id: Option<String>,
    pub region: Option<String>,
    pub role: Option<String>,
    pub batch: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: Option<String>,
    pub node_id: Option<String>,
    pub region: Option<String>,
    pub role: Option<String>,
    pub timestamp: Option<String>,
    pub metrics: SampleMetrics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMetrics {
    pub load1m: f64,
    pub cpu_count: u32,
    pub memory_percent: f64,
    pub uptime: f64, // secondes depuis le boot
    pub total_mem: Option<u64>,
    pub free_mem: Option<u64>,
    pub platform: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Degraded,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NodeRecord {
    pub name: String,
    pub region: String,
    pub status: NodeStatus,
    pub load: u32,       // pourcentage affiché, plafonné à 99
    pub latency: u32,    // ms
    pub traffic: String, // "x.y Gbps"
    pub role: String,
    pub uptime: String,  // heures entières, "42h"
    pub capacity: String,
    pub maintenance: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Info,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Alert {
    pub title: String,
    pub level: AlertLevel,
    pub metric: String,
    pub action: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimelineEntry {
    pub time: String, // "HH:MM"
    pub event: String,
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Snapshot {
    pub nodes: Vec<NodeRecord>,
    pub alerts: Vec<Alert>,
    pub timeline: Vec<TimelineEntry>,
}

/// Enveloppe poussée sur le flux WebSocket : { "type": "...", "payload": ... }
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum FeedMessage {
    Snapshot(Snapshot),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TelemetryAccepted {
    pub received: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlHealth {
    pub uptime_seconds: u64,
    pub nodes_tracked: u32,
    pub subscribers: u32,
    pub timeline_entries: u32,
}
