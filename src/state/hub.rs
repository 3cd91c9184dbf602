use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::events::ServerEvent;

/// Capacity of each per-session broadcast channel. Slow subscribers that lag
/// behind this many events skip ahead rather than stalling the publisher.
const CHANNEL_CAPACITY: usize = 64;

/// Publish/subscribe hub fanning session events out to every subscriber.
///
/// This is the broadcast-gateway boundary: the orchestrator only ever calls
/// [`SessionHub::publish`]; the WebSocket and SSE transports each bridge a
/// [`broadcast::Receiver`] onto their own wire format.
pub struct SessionHub {
    channels: DashMap<Uuid, broadcast::Sender<ServerEvent>>,
}

impl SessionHub {
    /// Create a hub with no channels; channels appear on first use.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    fn sender(&self, session_id: Uuid) -> broadcast::Sender<ServerEvent> {
        self.channels
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Register a new subscriber that will receive subsequent session events.
    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        self.sender(session_id).subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn publish(&self, session_id: Uuid, event: ServerEvent) {
        let _ = self.sender(session_id).send(event);
    }

    /// Number of live subscribers on a session's channel.
    pub fn subscriber_count(&self, session_id: Uuid) -> usize {
        self.channels
            .get(&session_id)
            .map(|entry| entry.value().receiver_count())
            .unwrap_or(0)
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str) -> ServerEvent {
        ServerEvent {
            name: name.to_string(),
            data: json!({"probe": name}),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = SessionHub::new();
        let session = Uuid::new_v4();

        let mut receiver = hub.subscribe(session);
        hub.publish(session, event("timer:update"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.name, "timer:update");
    }

    #[tokio::test]
    async fn sessions_are_isolated_from_each_other() {
        let hub = SessionHub::new();
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();

        let mut receiver_b = hub.subscribe(session_b);
        hub.publish(session_a, event("session:state"));
        hub.publish(session_b, event("scores:update"));

        let received = receiver_b.recv().await.unwrap();
        assert_eq!(received.name, "scores:update");
        assert!(receiver_b.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let hub = SessionHub::new();
        let session = Uuid::new_v4();
        hub.publish(session, event("pause:start"));
        assert_eq!(hub.subscriber_count(session), 0);
    }

    #[tokio::test]
    async fn subscriber_count_tracks_live_receivers() {
        let hub = SessionHub::new();
        let session = Uuid::new_v4();

        let first = hub.subscribe(session);
        let second = hub.subscribe(session);
        assert_eq!(hub.subscriber_count(session), 2);

        drop(first);
        drop(second);
        assert_eq!(hub.subscriber_count(session), 0);
    }
}
