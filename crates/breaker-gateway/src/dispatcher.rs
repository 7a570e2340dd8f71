use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use breaker_types::events::GatewayEvent;

/// A gateway event serialized once for every subscriber, with its channel
/// scope pulled out so connections can filter without re-parsing.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub channel_id: Option<Uuid>,
    pub json: Arc<str>,
}

/// Publishes persisted transmissions (and channel lifecycle events) to every
/// connected client. Delivery is at-least-once per subscribed client; the
/// receiving side de-duplicates by message id.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — every connection receives the
    /// stream and drops events outside its subscription set.
    broadcast_tx: broadcast::Sender<Outbound>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Fan an event out to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize gateway event: {e}");
                return;
            }
        };
        let _ = self.inner.broadcast_tx.send(Outbound {
            channel_id: event.channel_id(),
            json: json.into(),
        });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_subscriber_with_channel_scope() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let channel_id = Uuid::new_v4();
        dispatcher.broadcast(GatewayEvent::TransmissionDelete {
            channel_id,
            message_id: Uuid::new_v4(),
        });

        let out = rx.recv().await.unwrap();
        assert_eq!(out.channel_id, Some(channel_id));
        assert!(out.json.contains("TransmissionDelete"));
    }

    #[tokio::test]
    async fn global_events_carry_no_scope() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.broadcast(GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
            username: "alice".into(),
        });

        let out = rx.recv().await.unwrap();
        assert_eq!(out.channel_id, None);
    }
}
