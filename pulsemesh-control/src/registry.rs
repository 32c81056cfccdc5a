/**
 * REGISTRE DES NŒUDS - Dernier état connu par identité de nœud
 *
 * RÔLE :
 * Transforme chaque échantillon brut en fiche d'affichage (shape_node) et
 * conserve la dernière fiche par nœud. Remplacement intégral à chaque
 * échantillon, pas de fusion de champs. L'ordre d'insertion est préservé
 * pour que le dashboard et les alertes restent stables.
 */

use std::collections::HashMap;

use crate::models::{NodeRecord, NodeStatus, SampleMetrics};

/// Dérive la fiche d'affichage d'un nœud depuis ses métriques brutes.
///
/// latency et traffic sont des estimations synthétiques dérivées de la
/// pression mémoire, pas des mesures réseau. Les seuils et arrondis sont
/// contractuels : les alertes en aval en dépendent.
pub fn shape_node(name: &str, region: &str, role: &str, metrics: &SampleMetrics) -> NodeRecord {
    let cpus = metrics.cpu_count.max(1) as f64;
    let load_pct = ((metrics.load1m / cpus) * 100.0).round().min(99.0) as u32;
    let degraded = load_pct > 80 || metrics.memory_percent > 80.0;
    let latency = ((1.0 + metrics.memory_percent / 100.0) * 20.0).round().max(10.0) as u32;

    NodeRecord {
        name: name.to_string(),
        region: region.to_string(),
        status: if degraded { NodeStatus::Degraded } else { NodeStatus::Online },
        load: load_pct,
        latency,
        traffic: format_gbps(metrics.memory_percent / 100.0 * 2.0),
        role: role.to_string(),
        uptime: format!("{}h", (metrics.uptime / 3600.0).floor() as u64),
        capacity: format!("{} vCPU", metrics.cpu_count),
        maintenance: if degraded {
            "under observation".to_string()
        } else {
            "inspection complete".to_string()
        },
    }
}

/// Formate le débit avec une décimale, demis exacts arrondis vers le haut.
/// `{:.1}` arrondit les demis au pair et rendrait "0.2" pour 0.25.
fn format_gbps(value: f64) -> String {
    if !value.is_finite() || value < 0.0 {
        return format!("{value:.1} Gbps");
    }
    // 61 décimales couvrent le développement binaire exact à cette échelle,
    // le chiffre après la coupe est donc exact, jamais déjà arrondi.
    let exact = format!("{value:.61}");
    let (whole, frac) = match exact.split_once('.') {
        Some(parts) => parts,
        None => return format!("{value:.1} Gbps"),
    };
    let digits = frac.as_bytes();
    let kept = digits.first().copied().unwrap_or(b'0');
    if digits.get(1).copied().unwrap_or(b'0') < b'5' {
        return format!("{whole}.{} Gbps", kept as char);
    }
    if kept < b'9' {
        return format!("{whole}.{} Gbps", (kept + 1) as char);
    }
    // la retenue remonte dans la partie entière
    let mut carried = whole.as_bytes().to_vec();
    let mut idx = carried.len();
    loop {
        if idx == 0 {
            carried.insert(0, b'1');
            break;
        }
        idx -= 1;
        if carried[idx] == b'9' {
            carried[idx] = b'0';
        } else {
            carried[idx] += 1;
            break;
        }
    }
    format!("{}.0 Gbps", String::from_utf8_lossy(&carried))
}

pub struct NodeRegistry {
    nodes: HashMap<String, NodeRecord>,
    order: Vec<String>, // identités dans l'ordre de première apparition
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&NodeRecord> {
        self.nodes.get(name)
    }

    /// Remplace intégralement la fiche du nœud (last-writer-wins).
    pub fn upsert(&mut self, record: NodeRecord) {
        if !self.nodes.contains_key(&record.name) {
            self.order.push(record.name.clone());
        }
        self.nodes.insert(record.name.clone(), record);
    }

    /// Fiches dans l'ordre de première apparition.
    pub fn records(&self) -> impl Iterator<Item = &NodeRecord> {
        self.order.iter().filter_map(|name| self.nodes.get(name))
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
