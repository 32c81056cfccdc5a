/**
 * API REST PULSEMESH - Serveur HTTP du plan de contrôle
 *
 * RÔLE :
 * Expose l'ingestion de télémétrie des sondes et la lecture du snapshot
 * consolidé. Interface entre la flotte de sondes, le dashboard et les
 * outils d'administration.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, routes /health, /system/health, /api/nodes,
 *   /api/telemetry, plus le chemin WebSocket configuré
 * - Lecture manuelle du corps pour garder la main sur le plafond (400,
 *   pas 413) et sur les messages d'erreur JSON
 * - Un seul verrou FleetState pris le temps d'appliquer le batch,
 *   relâché avant la diffusion aux abonnés
 *
 * GESTION D'ERREURS :
 * 🎯 422 batch absent ou non-tableau, 400 JSON invalide ou corps trop
 *    gros, échantillon invalide ignoré avec un warn (batch non annulé)
 */

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::hub::BroadcastHub;
use crate::models::{ControlHealth, Sample, Snapshot, TelemetryAccepted, TelemetryRequest};
use crate::registry::shape_node;
use crate::state::{FleetState, Shared};
use crate::ws;

/// Plafond de lecture du corps, aligné sur le contrat publié (2 MB).
pub const MAX_BODY_BYTES: usize = 2_000_000;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Payload too large")]
    PayloadTooLarge,
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("batch is required")]
    BatchRequired,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match self {
            IngestError::PayloadTooLarge | IngestError::Json(_) => StatusCode::BAD_REQUEST,
            IngestError::BatchRequired => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub fleet: Shared<FleetState>,
    pub hub: Arc<BroadcastHub>,
    pub started: Instant,
}

pub fn build_router(app_state: AppState, ws_path: &str) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/nodes", get(get_nodes))
        .route("/api/telemetry", post(post_telemetry))
        .route(ws_path, get(ws::feed_upgrade))
        .fallback(not_found)
        .with_state(app_state)
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "Not found" })),
    )
}

// GET /api/nodes (snapshot consolidé)
async fn get_nodes(State(app): State<AppState>) -> Json<Snapshot> {
    let snapshot = app.fleet.lock().snapshot();
    Json(snapshot)
}

// GET /system/health (état du plan de contrôle)
async fn get_system_health(State(app): State<AppState>) -> Json<ControlHealth> {
    let (nodes_tracked, timeline_entries) = {
        let fleet = app.fleet.lock();
        (fleet.registry.len() as u32, fleet.timeline.len() as u32)
    };
    Json(ControlHealth {
        uptime_seconds: app.started.elapsed().as_secs(),
        nodes_tracked,
        subscribers: app.hub.subscriber_count() as u32,
        timeline_entries,
    })
}

// POST /api/telemetry (ingestion d'un batch de sondes)
async fn post_telemetry(
    State(app): State<AppState>,
    req: Request,
) -> Result<(StatusCode, Json<TelemetryAccepted>), IngestError> {
    let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| IngestError::PayloadTooLarge)?;

    // corps vide toléré comme un objet vide, rejeté ensuite sur le batch
    let request: TelemetryRequest = if body.is_empty() {
        TelemetryRequest {
            node_id: None,
            region: None,
            role: None,
            batch: None,
        }
    } else {
        serde_json::from_slice(&body)?
    };

    let (received, snapshot) = {
        let mut fleet = app.fleet.lock();
        let received = apply_batch(&mut fleet, request)?;
        (received, fleet.snapshot())
    };

    if let Some(frame) = ws::snapshot_frame(snapshot) {
        app.hub.broadcast(frame);
    }
    debug!("applied telemetry batch, {received} samples");

    Ok((StatusCode::ACCEPTED, Json(TelemetryAccepted { received })))
}

/// Applique un batch sous le verrou flotte : résolution des identités
/// (échantillon → requête → défaut généré), upsert du registre, timeline,
/// puis un seul recalcul d'alertes pour tout le batch.
fn apply_batch(fleet: &mut FleetState, request: TelemetryRequest) -> Result<usize, IngestError> {
    let batch = match request.batch {
        Some(Value::Array(items)) => items,
        _ => return Err(IngestError::BatchRequired),
    };

    let default_node = request
        .node_id
        .unwrap_or_else(|| format!("node-{}", fleet.registry.len() + 1));
    let default_region = request.region.unwrap_or_else(|| "unknown".to_string());
    let default_role = request.role.unwrap_or_else(|| "edge".to_string());

    let mut applied = 0;
    for raw in batch {
        let sample: Sample = match serde_json::from_value(raw) {
            Ok(sample) => sample,
            Err(e) => {
                warn!("skipping malformed sample in batch: {e}");
                continue;
            }
        };
        let name = sample.node_id.as_deref().unwrap_or(&default_node);
        let region = sample.region.as_deref().unwrap_or(&default_region);
        let role = sample.role.as_deref().unwrap_or(&default_role);

        let record = shape_node(name, region, role, &sample.metrics);
        fleet.timeline.record(&record.name, &record.region, &record.role);
        fleet.registry.upsert(record);
        applied += 1;
    }

    fleet.refresh_alerts();
    Ok(applied)
}
