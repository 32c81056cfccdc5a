/**
 * PULSEMESH CONTROL - Point d'entrée du plan de contrôle
 *
 * RÔLE : Bootstrap complet : env, logging, état partagé de la flotte,
 * hub de diffusion, routeur HTTP et écoute.
 *
 * ARCHITECTURE : ingestion REST + fan-out WebSocket sur un état unique
 * sous verrou. UTILITÉ : point d'agrégation central des sondes Pulsemesh.
 */

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use pulsemesh_control::config::ControlConfig;
use pulsemesh_control::http::{self, AppState};
use pulsemesh_control::hub::BroadcastHub;
use pulsemesh_control::state::{new_state, FleetState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulsemesh_control=info,info".into()),
        )
        .init();

    let cfg = ControlConfig::from_env();

    let app_state = AppState {
        fleet: new_state(FleetState::new()),
        hub: Arc::new(BroadcastHub::new()),
        started: Instant::now(),
    };

    let app = http::build_router(app_state, &cfg.ws_path);

    let listener = TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cfg.host, cfg.port))?;
    let addr = listener.local_addr().context("listener has no local addr")?;
    info!("control plane listening on http://{addr}");
    info!("websocket feed at ws://{addr}{}", cfg.ws_path);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
