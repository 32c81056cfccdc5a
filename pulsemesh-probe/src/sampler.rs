//! Local metric collection via sysinfo.

use chrono::Utc;
use sysinfo::System;
use uuid::Uuid;

use crate::config::ProbeConfig;
use crate::models::{Sample, SampleMetrics};

/// Anything that can produce a health sample. The scheduler only calls
/// `collect`, which lets tests substitute a scripted source.
pub trait SampleSource {
    fn collect(&mut self) -> Sample;
}

/// Samples the host the probe runs on.
pub struct SystemSampler {
    sys: System,
    node_id: String,
    region: String,
    role: String,
}

impl SystemSampler {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            sys: System::new_all(),
            node_id: config.node_id.clone(),
            region: config.region.clone(),
            role: config.role.clone(),
        }
    }
}

impl SampleSource for SystemSampler {
    fn collect(&mut self) -> Sample {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        let free = self.sys.free_memory();
        let used = total.saturating_sub(free);
        let memory_percent = if total > 0 {
            round2(used as f64 / total as f64 * 100.0)
        } else {
            0.0
        };

        Sample {
            id: Uuid::new_v4().to_string(),
            node_id: self.node_id.clone(),
            region: self.region.clone(),
            role: self.role.clone(),
            timestamp: Utc::now(),
            metrics: SampleMetrics {
                load1m: round2(System::load_average().one),
                cpu_count: self.sys.cpus().len(),
                memory_percent,
                total_mem: total,
                free_mem: free,
                uptime: System::uptime(),
                platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            },
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
