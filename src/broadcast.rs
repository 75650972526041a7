use log::debug;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outbound queue depth per client. A client that falls this far behind
/// starts losing individual messages rather than slowing anyone else down.
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

/// Fans serialized messages out to every connected streaming client.
///
/// Each client owns an SPSC queue drained by its writer task; `broadcast`
/// serializes once and enqueues without ever blocking.
pub struct Broadcaster {
    clients: RwLock<HashMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a client queue; returns the id used to unregister it.
    pub fn register(&self, tx: mpsc::Sender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.clients.write().insert(id, tx);
        id
    }

    pub fn unregister(&self, id: u64) {
        self.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Serialize `{type, data}` once and try-send it to every client. A
    /// full queue drops this message for that client only.
    pub fn broadcast<T: Serialize>(&self, message_type: &str, data: &T) {
        let envelope = match Self::envelope(message_type, data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Failed to serialize {} broadcast: {}", message_type, e);
                return;
            }
        };

        let clients = self.clients.read();
        for (id, tx) in clients.iter() {
            match tx.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("Client {} queue full, dropping {} message", id, message_type);
                }
                Err(TrySendError::Closed(_)) => {
                    // Writer already gone; the reader task cleans this up
                }
            }
        }
    }

    /// The wire envelope shared by broadcasts and the per-client init push.
    pub fn envelope<T: Serialize>(message_type: &str, data: &T) -> serde_json::Result<String> {
        serde_json::to_string(&json!({ "type": message_type, "data": data }))
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clients_receive_messages_in_order() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        broadcaster.register(tx);

        for i in 0..5 {
            broadcaster.broadcast("packet", &i);
        }
        for i in 0..5 {
            let message = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&message).unwrap();
            assert_eq!(value["type"], "packet");
            assert_eq!(value["data"], i);
        }
    }

    #[tokio::test]
    async fn full_queue_drops_only_that_client() {
        let broadcaster = Broadcaster::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(2);
        let (fast_tx, mut fast_rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        broadcaster.register(slow_tx);
        broadcaster.register(fast_tx);

        for i in 0..10 {
            broadcaster.broadcast("packet", &i);
        }

        // The fast client saw everything
        for i in 0..10 {
            let message = fast_rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&message).unwrap();
            assert_eq!(value["data"], i);
        }
        // The slow client kept only its queue depth, oldest first
        let mut received = Vec::new();
        while let Ok(message) = slow_rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&message).unwrap();
            received.push(value["data"].as_i64().unwrap());
        }
        assert_eq!(received, vec![0, 1]);
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let id = broadcaster.register(tx);
        assert_eq!(broadcaster.client_count(), 1);

        broadcaster.unregister(id);
        assert_eq!(broadcaster.client_count(), 0);
        broadcaster.broadcast("stats", &42);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_client_does_not_poison_broadcast() {
        let broadcaster = Broadcaster::new();
        let (dead_tx, dead_rx) = mpsc::channel(1);
        drop(dead_rx);
        let (live_tx, mut live_rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        broadcaster.register(dead_tx);
        broadcaster.register(live_tx);

        broadcaster.broadcast("stats", &"ok");
        assert!(live_rx.recv().await.is_some());
    }
}
