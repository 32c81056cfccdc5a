use std::collections::VecDeque;

use time::macros::format_description;
use time::OffsetDateTime;

use crate::models::TimelineEntry;

/// Profondeur de l'anneau d'événements récents.
pub const MAX_ENTRIES: usize = 6;

/// Journal borné des dernières ingestions, entrée la plus récente en tête.
/// Pas de déduplication : chaque échantillon appliqué produit une entrée.
pub struct TimelineLog {
    entries: VecDeque<TimelineEntry>,
}

impl TimelineLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(MAX_ENTRIES),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insère une entrée en tête et tronque au-delà de MAX_ENTRIES.
    pub fn record(&mut self, node: &str, region: &str, role: &str) {
        let time = OffsetDateTime::now_utc()
            .format(&format_description!("[hour]:[minute]"))
            .unwrap_or_default();
        self.entries.push_front(TimelineEntry {
            time,
            event: format!("{node} telemetry update"),
            detail: format!("{region} · {role}"),
        });
        self.entries.truncate(MAX_ENTRIES);
    }

    /// Entrées de la plus récente à la plus ancienne.
    pub fn entries(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries.iter()
    }
}

impl Default for TimelineLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_newest_first() {
        let mut log = TimelineLog::new();
        log.record("a", "eu", "edge");
        log.record("b", "us", "relay");

        let events: Vec<&str> = log.entries().map(|e| e.event.as_str()).collect();
        assert_eq!(events, vec!["b telemetry update", "a telemetry update"]);
        assert_eq!(log.entries().next().unwrap().detail, "us · relay");
    }

    #[test]
    fn test_ring_keeps_six_newest() {
        let mut log = TimelineLog::new();
        for i in 0..9 {
            log.record(&format!("node-{i}"), "eu", "edge");
        }
        assert_eq!(log.len(), MAX_ENTRIES);
        let events: Vec<&str> = log.entries().map(|e| e.event.as_str()).collect();
        assert_eq!(events[0], "node-8 telemetry update");
        assert_eq!(events[5], "node-3 telemetry update");
    }

    #[test]
    fn test_no_deduplication() {
        let mut log = TimelineLog::new();
        log.record("same", "eu", "edge");
        log.record("same", "eu", "edge");
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_timestamp_shape() {
        let mut log = TimelineLog::new();
        log.record("a", "eu", "edge");
        let time = &log.entries().next().unwrap().time;
        assert_eq!(time.len(), 5, "expected HH:MM, got {time}");
        assert_eq!(time.as_bytes()[2], b':');
    }
}
