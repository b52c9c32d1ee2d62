//! Update channel: fan-out of [`HmrMessage`]s to connected clients.
//!
//! Each client owns a bounded queue. Broadcasts never wait: a full queue
//! drops the message for that client, a closed one unregisters it.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::hmr::HmrMessage;

/// Serialized message as queued for a client.
pub type Payload = Arc<str>;

#[derive(Debug)]
pub struct UpdateChannel {
    capacity: usize,
    clients: RwLock<FxHashMap<usize, mpsc::Sender<Payload>>>,
    next_id: AtomicUsize,
}

impl UpdateChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clients: RwLock::new(FxHashMap::default()),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Register a client. Its queue already holds the `connected` ack.
    pub fn register(&self) -> (usize, mpsc::Receiver<Payload>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        match HmrMessage::Connected.to_json() {
            Ok(ack) => {
                // fresh channel with capacity >= 1
                let _ = tx.try_send(ack.into());
            }
            Err(e) => tracing::error!(error = %e, "failed to encode connected message"),
        }

        self.clients.write().insert(id, tx);
        tracing::debug!(client = id, "client connected");
        (id, rx)
    }

    pub fn unregister(&self, id: usize) {
        if self.clients.write().remove(&id).is_some() {
            tracing::debug!(client = id, "client disconnected");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Send one message to every client. Returns how many queued it.
    pub fn broadcast(&self, message: &HmrMessage) -> usize {
        let payload: Payload = match message.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode update");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in self.clients.read().iter() {
            match tx.try_send(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(client = id, "client queue full, dropping update");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            self.unregister(id);
        }
        tracing::debug!(delivered, payload = %payload, "broadcast update");
        delivered
    }

    pub fn broadcast_all(&self, messages: &[HmrMessage]) {
        for message in messages {
            self.broadcast(message);
        }
    }

    /// Broadcast an application-defined event.
    pub fn send_custom(&self, event: impl Into<String>, data: serde_json::Value) -> usize {
        self.broadcast(&HmrMessage::CustomEvent {
            id: event.into(),
            custom_data: data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(payload: &Payload) -> HmrMessage {
        serde_json::from_str(payload).unwrap()
    }

    #[tokio::test]
    async fn test_new_client_gets_ack_but_no_replay() {
        let channel = UpdateChannel::new(8);
        channel.broadcast(&HmrMessage::full_reload("/a.js", 1));

        let (_, mut rx) = channel.register();
        assert_eq!(decode(&rx.recv().await.unwrap()), HmrMessage::Connected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let channel = UpdateChannel::new(8);
        let (_, mut a) = channel.register();
        let (_, mut b) = channel.register();
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        let msg = HmrMessage::full_reload("/a.js", 2);
        assert_eq!(channel.broadcast(&msg), 2);
        assert_eq!(decode(&a.recv().await.unwrap()), msg);
        assert_eq!(decode(&b.recv().await.unwrap()), msg);
    }

    #[tokio::test]
    async fn test_closed_client_does_not_affect_others() {
        let channel = UpdateChannel::new(8);
        let (_, gone) = channel.register();
        let (_, mut alive) = channel.register();
        drop(gone);
        alive.recv().await.unwrap();

        assert_eq!(channel.broadcast(&HmrMessage::full_reload("/a.js", 3)), 1);
        assert_eq!(channel.client_count(), 1);
        assert!(alive.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_full_queue_drops_message() {
        let channel = UpdateChannel::new(1);
        let (_, mut rx) = channel.register();

        // queue still holds the ack
        assert_eq!(channel.broadcast(&HmrMessage::full_reload("/a.js", 4)), 0);
        assert_eq!(channel.client_count(), 1);
        assert_eq!(decode(&rx.recv().await.unwrap()), HmrMessage::Connected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_custom() {
        let channel = UpdateChannel::new(4);
        let (_, mut rx) = channel.register();
        rx.recv().await.unwrap();

        channel.send_custom("reload-config", json!({ "a": 1 }));
        let value: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "type": "custom-event", "id": "reload-config", "customData": { "a": 1 } })
        );
    }
}
