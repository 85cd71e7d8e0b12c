use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::notify::{RealtimeTransport, TransportError};

/// An event addressed to one party's room.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PartyEvent {
    pub room: String,
    pub event: String,
    pub payload: Value,
}

/// Real-time transport over a tokio broadcast channel. WebSocket sessions
/// subscribe and forward only the events for their own room.
#[derive(Clone)]
pub struct BroadcastRealtime {
    tx: broadcast::Sender<PartyEvent>,
}

impl BroadcastRealtime {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PartyEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl RealtimeTransport for BroadcastRealtime {
    async fn emit_to_party(
        &self,
        room: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), TransportError> {
        let event = PartyEvent {
            room: room.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        };

        // No subscribers means nobody is connected; at-most-once allows the drop.
        if self.tx.send(event).is_err() {
            trace!(room, "no real-time subscribers");
        }
        Ok(())
    }
}
