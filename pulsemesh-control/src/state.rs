use parking_lot::Mutex;
use std::sync::Arc;

use crate::alerts;
use crate::models::{Alert, Snapshot};
use crate::registry::NodeRegistry;
use crate::timeline::TimelineLog;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// État consolidé de la flotte : registre des nœuds, alertes courantes,
/// timeline des derniers événements. Un seul verrou pour les trois, pris
/// le temps d'appliquer un batch puis relâché avant toute diffusion.
pub struct FleetState {
    pub registry: NodeRegistry,
    pub alerts: Vec<Alert>,
    pub timeline: TimelineLog,
}

impl FleetState {
    pub fn new() -> Self {
        Self {
            registry: NodeRegistry::new(),
            alerts: Vec::new(),
            timeline: TimelineLog::new(),
        }
    }

    /// Recalcule la liste d'alertes à partir du registre courant.
    pub fn refresh_alerts(&mut self) {
        self.alerts = alerts::evaluate(&self.registry);
    }

    /// Copie consolidée envoyée aux abonnés et servie par l'API REST.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            nodes: self.registry.records().cloned().collect(),
            alerts: self.alerts.clone(),
            timeline: self.timeline.entries().cloned().collect(),
        }
    }
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new()
    }
}
