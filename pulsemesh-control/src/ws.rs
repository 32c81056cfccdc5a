/**
 * TRANSPORT WEBSOCKET - Upgrade manuel et tâche de connexion
 *
 * RÔLE :
 * Négocie la poignée de main RFC 6455 à la main (pas de couche WS tierce)
 * puis sert chaque abonné depuis sa propre tâche : premier snapshot à la
 * connexion, relais des trames diffusées par le hub, réponse aux ping et
 * aux close. Le flux est unidirectionnel, les trames de données entrantes
 * sont ignorées.
 *
 * FONCTIONNEMENT :
 * - handler Axum : vérifie la clé, répond 101 avec le token d'acceptation
 *   et récupère la connexion via hyper::upgrade::OnUpgrade
 * - la tâche de connexion boucle en select! entre le canal du hub et la
 *   lecture socket ; tout échec d'écriture désabonne et termine
 */

use std::io;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::http::AppState;
use crate::models::{FeedMessage, Snapshot};
use crate::wire::{self, OP_CLOSE, OP_PING, OP_PONG, OP_TEXT};

/// Sérialise un snapshot dans son enveloppe et l'encode en trame texte
/// prête à écrire. L'encodage est fait une seule fois par diffusion.
pub fn snapshot_frame(snapshot: Snapshot) -> Option<Bytes> {
    match serde_json::to_vec(&FeedMessage::Snapshot(snapshot)) {
        Ok(json) => Some(Bytes::from(wire::encode_frame(OP_TEXT, &json))),
        Err(e) => {
            warn!("failed to encode snapshot frame: {e}");
            None
        }
    }
}

/// GET sur le chemin WebSocket : poignée de main puis bascule de la
/// connexion vers la tâche d'abonné.
pub async fn feed_upgrade(State(app): State<AppState>, mut req: Request) -> Response {
    let accept = {
        let key = req
            .headers()
            .get(header::SEC_WEBSOCKET_KEY)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty());
        match key {
            Some(key) => wire::accept_token(key),
            None => return bad_handshake("missing Sec-WebSocket-Key header"),
        }
    };

    let accept_value = match HeaderValue::from_str(&accept) {
        Ok(value) => value,
        Err(_) => return bad_handshake("unusable Sec-WebSocket-Key"),
    };

    let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
        return bad_handshake("connection is not upgradable");
    };

    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => serve_subscriber(TokioIo::new(upgraded), app).await,
            Err(e) => debug!("websocket upgrade failed: {e}"),
        }
    });

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept_value);
    response
}

fn bad_handshake(message: &str) -> Response {
    debug!("rejected websocket handshake: {message}");
    let mut response = Response::new(Body::from(message.to_owned()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

enum Step {
    Continue,
    Close,
}

/// Boucle de vie d'un abonné : snapshot initial, puis relais du hub et
/// traitement des trames de contrôle entrantes jusqu'à la déconnexion.
pub(crate) async fn serve_subscriber<S>(stream: S, app: AppState)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (id, mut outbound) = app.hub.subscribe();
    info!("feed subscriber {id} connected");

    let first = {
        let fleet = app.fleet.lock();
        snapshot_frame(fleet.snapshot())
    };
    if let Some(frame) = first {
        if writer.write_all(&frame).await.is_err() {
            app.hub.unsubscribe(id);
            return;
        }
    }

    let mut inbound: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if writer.write_all(&frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            read = reader.read(&mut chunk) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        inbound.extend_from_slice(&chunk[..n]);
                        match drain_inbound(&mut inbound, &mut writer).await {
                            Ok(Step::Continue) => {}
                            Ok(Step::Close) | Err(_) => break,
                        }
                    }
                }
            }
        }
    }

    app.hub.unsubscribe(id);
    info!("feed subscriber {id} disconnected");
}

/// Consomme toutes les trames complètes du tampon de lecture. Ping reçoit
/// un pong portant la même charge, close reçoit un close et termine la
/// connexion, une trame invalide termine aussi.
async fn drain_inbound<W>(inbound: &mut Vec<u8>, writer: &mut W) -> io::Result<Step>
where
    W: AsyncWrite + Unpin,
{
    loop {
        match wire::decode_frame(inbound) {
            Ok(Some((frame, used))) => {
                inbound.drain(..used);
                match frame.opcode {
                    OP_CLOSE => {
                        writer.write_all(&wire::encode_frame(OP_CLOSE, &[])).await?;
                        return Ok(Step::Close);
                    }
                    OP_PING => {
                        writer
                            .write_all(&wire::encode_frame(OP_PONG, &frame.payload))
                            .await?;
                    }
                    _ => {}
                }
            }
            Ok(None) => return Ok(Step::Continue),
            Err(e) => {
                debug!("closing subscriber on bad frame: {e}");
                return Ok(Step::Close);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::BroadcastHub;
    use crate::models::SampleMetrics;
    use crate::registry::shape_node;
    use crate::state::{new_state, FleetState};
    use std::sync::Arc;
    use std::time::Instant;

    fn test_state() -> AppState {
        AppState {
            fleet: new_state(FleetState::new()),
            hub: Arc::new(BroadcastHub::new()),
            started: Instant::now(),
        }
    }

    fn masked_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
        let key = [0x37, 0xFA, 0x21, 0x3D];
        let mut frame = vec![0x80 | opcode, 0x80 | payload.len() as u8];
        frame.extend_from_slice(&key);
        for (i, byte) in payload.iter().enumerate() {
            frame.push(byte ^ key[i % 4]);
        }
        frame
    }

    async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> wire::Frame
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some((frame, used)) = wire::decode_frame(buf).unwrap() {
                buf.drain(..used);
                return frame;
            }
            let n = reader.read(&mut chunk).await.unwrap();
            assert!(n > 0, "stream closed before a full frame arrived");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn test_subscriber_snapshot_ping_close() {
        let app = test_state();
        let hub = app.hub.clone();
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(serve_subscriber(server, app));

        let (mut read_half, mut write_half) = tokio::io::split(client);
        let mut buf = Vec::new();

        // unsolicited snapshot right after the upgrade
        let frame = read_frame(&mut read_half, &mut buf).await;
        assert_eq!(frame.opcode, OP_TEXT);
        let message: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(message["type"], "snapshot");
        assert!(message["payload"]["nodes"].as_array().unwrap().is_empty());
        assert_eq!(hub.subscriber_count(), 1);

        // masked ping comes back as a pong carrying the same payload
        write_half
            .write_all(&masked_frame(OP_PING, b"hi"))
            .await
            .unwrap();
        let frame = read_frame(&mut read_half, &mut buf).await;
        assert_eq!(frame.opcode, OP_PONG);
        assert_eq!(frame.payload, b"hi");

        // close is acknowledged and the subscriber deregisters
        write_half
            .write_all(&masked_frame(OP_CLOSE, &[]))
            .await
            .unwrap();
        let frame = read_frame(&mut read_half, &mut buf).await;
        assert_eq!(frame.opcode, OP_CLOSE);
        task.await.unwrap();
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_frame_reaches_live_connection() {
        let app = test_state();
        let hub = app.hub.clone();
        let fleet = app.fleet.clone();
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve_subscriber(server, app));

        let (mut read_half, _write_half) = tokio::io::split(client);
        let mut buf = Vec::new();
        let _initial = read_frame(&mut read_half, &mut buf).await;

        // mutate the fleet and fan out, like the ingestion path does
        let frame = {
            let mut fleet = fleet.lock();
            let metrics = SampleMetrics {
                load1m: 9.6,
                cpu_count: 4,
                memory_percent: 85.0,
                uptime: 7200.0,
                total_mem: None,
                free_mem: None,
                platform: None,
            };
            fleet.registry.upsert(shape_node("n1", "eu", "edge", &metrics));
            fleet.refresh_alerts();
            snapshot_frame(fleet.snapshot()).unwrap()
        };
        hub.broadcast(frame);

        let frame = read_frame(&mut read_half, &mut buf).await;
        let message: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(message["payload"]["nodes"][0]["name"], "n1");
        assert_eq!(message["payload"]["nodes"][0]["status"], "degraded");
        assert_eq!(message["payload"]["alerts"][0]["level"], "warning");
    }

    #[tokio::test]
    async fn test_client_disconnect_deregisters() {
        let app = test_state();
        let hub = app.hub.clone();
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(serve_subscriber(server, app));

        let (mut read_half, write_half) = tokio::io::split(client);
        let mut buf = Vec::new();
        let _initial = read_frame(&mut read_half, &mut buf).await;
        assert_eq!(hub.subscriber_count(), 1);

        // dropping both halves closes the stream; the task must deregister
        drop(read_half);
        drop(write_half);
        task.await.unwrap();
        assert_eq!(hub.subscriber_count(), 0);
    }
}
