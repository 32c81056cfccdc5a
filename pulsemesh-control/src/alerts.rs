use crate::models::{Alert, AlertLevel, NodeStatus};
use crate::registry::NodeRegistry;

/// Nombre maximal d'alertes exposées aux abonnés.
pub const MAX_ALERTS: usize = 5;

/// Seuil de charge (%) au-delà duquel un nœud passe en warning.
pub const LOAD_WARNING_PCT: u32 = 85;

/// Recalcule la liste d'alertes complète depuis le registre. Aucun état
/// entre deux appels : chaque batch appliqué écrase la liste précédente.
pub fn evaluate(registry: &NodeRegistry) -> Vec<Alert> {
    let mut alerts = Vec::new();
    for node in registry.records() {
        if node.load > LOAD_WARNING_PCT {
            alerts.push(Alert {
                title: format!("{} load approaching limit", node.name),
                level: AlertLevel::Warning,
                metric: format!("{}%", node.load),
                action: "scale out or shift traffic to a standby node".to_string(),
            });
        } else if node.status == NodeStatus::Degraded {
            alerts.push(Alert {
                title: format!("{} running degraded", node.name),
                level: AlertLevel::Info,
                metric: node.traffic.clone(),
                action: "automatic watch triggered".to_string(),
            });
        }
    }
    alerts.truncate(MAX_ALERTS);
    alerts
}
