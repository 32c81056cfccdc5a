/*!
 * PULSEMESH CONTROL - Plan de contrôle de la flotte
 *
 * Ingestion de la télémétrie des sondes, registre du dernier état par
 * nœud, alertes et timeline bornées, diffusion temps réel du snapshot
 * vers les abonnés WebSocket via un codec de trames maison.
 */

pub mod alerts;
pub mod config;
pub mod http;
pub mod hub;
pub mod models;
pub mod registry;
pub mod state;
pub mod timeline;
pub mod wire;
pub mod ws;
