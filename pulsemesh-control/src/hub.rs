/**
 * HUB DE DIFFUSION - Fan-out des snapshots vers les abonnés WebSocket
 *
 * RÔLE :
 * Tient le registre des connexions actives et leur pousse la même trame
 * encodée. Chaque abonné possède un canal borné ; l'écriture socket
 * reste dans la tâche de connexion, jamais sous le verrou du hub.
 *
 * FONCTIONNEMENT :
 * - subscribe/unsubscribe : identifiants monotones, retrait idempotent
 * - broadcast : copie de la liste sous verrou, envois hors verrou,
 *   purge des canaux fermés ou saturés au passage
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, warn};

/// Trames en attente par abonné ; une file pleine vaut déconnexion.
const FEED_QUEUE_DEPTH: usize = 32;

pub struct BroadcastHub {
    subscribers: Mutex<HashMap<u64, Sender<Bytes>>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Enregistre un abonné et retourne son identifiant et le canal à
    /// drainer depuis la tâche de connexion.
    pub fn subscribe(&self) -> (u64, Receiver<Bytes>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(FEED_QUEUE_DEPTH);
        self.subscribers.lock().insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Pousse la même trame à tous les abonnés. Les canaux dont le
    /// récepteur a disparu, ou qui ne drainent plus, sont retirés.
    pub fn broadcast(&self, frame: Bytes) {
        let targets: Vec<(u64, Sender<Bytes>)> = {
            let subscribers = self.subscribers.lock();
            if subscribers.is_empty() {
                return;
            }
            subscribers.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("feed subscriber {id} stopped draining, dropping it");
                    dead.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("dropping closed feed subscriber {id}");
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.lock();
            for id in dead {
                subscribers.remove(&id);
            }
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_every_subscriber() {
        let hub = BroadcastHub::new();
        let (_id_a, mut rx_a) = hub.subscribe();
        let (_id_b, mut rx_b) = hub.subscribe();

        hub.broadcast(Bytes::from_static(b"frame"));

        assert_eq!(rx_a.try_recv().unwrap(), Bytes::from_static(b"frame"));
        assert_eq!(rx_b.try_recv().unwrap(), Bytes::from_static(b"frame"));
    }

    #[test]
    fn test_broadcast_prunes_dead_subscribers() {
        let hub = BroadcastHub::new();
        let (_id_a, rx_a) = hub.subscribe();
        let (_id_b, mut rx_b) = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(rx_a);
        hub.broadcast(Bytes::from_static(b"x"));

        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(rx_b.try_recv().unwrap(), Bytes::from_static(b"x"));
    }

    #[test]
    fn test_wedged_subscriber_gets_dropped() {
        let hub = BroadcastHub::new();
        let (_id, mut rx) = hub.subscribe();

        // a subscriber that never drains absorbs FEED_QUEUE_DEPTH frames
        for _ in 0..FEED_QUEUE_DEPTH {
            hub.broadcast(Bytes::from_static(b"frame"));
        }
        assert_eq!(hub.subscriber_count(), 1);

        // the next broadcast finds the queue full and evicts it
        hub.broadcast(Bytes::from_static(b"frame"));
        assert_eq!(hub.subscriber_count(), 0);

        for _ in 0..FEED_QUEUE_DEPTH {
            assert!(rx.try_recv().is_ok());
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let hub = BroadcastHub::new();
        let (id, _rx) = hub.subscribe();
        hub.unsubscribe(id);
        hub.unsubscribe(id);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let hub = BroadcastHub::new();
        let (a, _rx_a) = hub.subscribe();
        let (b, _rx_b) = hub.subscribe();
        assert_ne!(a, b);
    }
}
