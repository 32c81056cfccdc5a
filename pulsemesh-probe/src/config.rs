//! Probe configuration, sourced from the environment.
//!
//! Every knob has a default that works against a control plane on
//! localhost, so a bare `pulsemesh-probe` invocation starts reporting
//! without any setup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Keepalive pushes never fire more often than this.
const KEEPALIVE_FLOOR: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Telemetry ingestion URL on the control plane.
    pub endpoint: String,
    /// Stable identity reported with every batch.
    pub node_id: String,
    pub region: String,
    pub role: String,
    /// Samples per push; the buffer flushes once it holds this many.
    pub batch_size: usize,
    /// Gap between local metric collections.
    pub push_interval: Duration,
    /// Hard cap on buffered samples awaiting delivery.
    pub buffer_limit: usize,
    /// Keepalive fires every `push_interval * keepalive_mult`, floored.
    pub keepalive_mult: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5050/api/telemetry".to_string(),
            node_id: default_node_id(),
            region: "unassigned".to_string(),
            role: "edge-cache".to_string(),
            batch_size: 10,
            push_interval: Duration::from_millis(5000),
            buffer_limit: 100,
            keepalive_mult: 2,
        }
    }
}

impl ProbeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env_or("PULSEMESH_ENDPOINT", &defaults.endpoint),
            node_id: env_or("PULSEMESH_NODE_ID", &defaults.node_id),
            region: env_or("PULSEMESH_REGION", &defaults.region),
            role: env_or("PULSEMESH_ROLE", &defaults.role),
            batch_size: env_parse("PULSEMESH_BATCH_SIZE", defaults.batch_size).max(1),
            // floored at 1ms, tokio panics on a zero interval period
            push_interval: Duration::from_millis(
                env_parse(
                    "PULSEMESH_PUSH_INTERVAL_MS",
                    defaults.push_interval.as_millis() as u64,
                )
                .max(1),
            ),
            buffer_limit: env_parse("PULSEMESH_BUFFER_LIMIT", defaults.buffer_limit).max(1),
            keepalive_mult: env_parse("PULSEMESH_KEEPALIVE_MULT", defaults.keepalive_mult).max(1),
        }
    }

    /// Interval for the keepalive flush that retries a full backlog
    /// whose threshold trigger lost the in-flight race.
    pub fn keepalive_interval(&self) -> Duration {
        (self.push_interval * self.keepalive_mult).max(KEEPALIVE_FLOOR)
    }
}

fn default_node_id() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|_| "probe".to_string())
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("invalid value for {name}: {raw:?}, using default");
            default
        }),
        Err(_) => default,
    }
}
