//! Broadcast surface handed to the facade
//!
//! Mutation handlers call these after a successful write. Delivery is
//! fire-and-forget: currently connected, subscribed recipients get the event,
//! nobody waits or fails. Before a transport is attached every broadcast is a
//! logged no-op, so a mutation that succeeded in storage never fails just
//! because nobody is listening yet.

use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use super::events::{group_room, user_room, ServerMessage};
use super::registry::RoomRegistry;

pub struct EventGateway {
    registry: OnceLock<Arc<RoomRegistry>>,
}

impl EventGateway {
    /// Create a detached gateway
    pub fn new() -> Self {
        Self {
            registry: OnceLock::new(),
        }
    }

    /// Attach the connection registry; done once at process start
    pub fn attach(&self, registry: Arc<RoomRegistry>) {
        if self.registry.set(registry).is_err() {
            warn!("Event gateway already attached, ignoring");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.registry.get().is_some()
    }

    fn registry(&self) -> Option<&Arc<RoomRegistry>> {
        let registry = self.registry.get();
        if registry.is_none() {
            warn!("Broadcast dropped: event gateway has no transport attached");
        }
        registry
    }

    /// Deliver an event to every connection
    pub fn broadcast_to_all(&self, event: &str, payload: Value) {
        if let Some(registry) = self.registry() {
            let delivered = registry.send_to_all(&ServerMessage::event(event, payload));
            debug!(event, delivered, "Broadcast to all");
        }
    }

    /// Deliver an event to a group's room
    pub fn broadcast_to_group(&self, group_id: &str, event: &str, payload: Value) {
        if let Some(registry) = self.registry() {
            let room = group_room(group_id);
            let delivered = registry.send_to_room(&room, &ServerMessage::event(event, payload));
            debug!(event, room, delivered, "Broadcast to group");
        }
    }

    /// Deliver an event to a user's personal room
    pub fn broadcast_to_user(&self, user_id: &str, event: &str, payload: Value) {
        if let Some(registry) = self.registry() {
            let room = user_room(user_id);
            let delivered = registry.send_to_room(&room, &ServerMessage::event(event, payload));
            debug!(event, room, delivered, "Broadcast to user");
        }
    }
}

impl Default for EventGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_detached_broadcasts_are_silent_noops() {
        let gateway = EventGateway::new();
        assert!(!gateway.is_attached());
        // Must not panic or error
        gateway.broadcast_to_all("news_broadcast", serde_json::json!({}));
        gateway.broadcast_to_group("g-1", "group_updated", serde_json::json!({}));
        gateway.broadcast_to_user("u-1", "progress_updated", serde_json::json!({}));
    }

    #[test]
    fn test_user_room_targeting() {
        let registry = Arc::new(RoomRegistry::new(8));
        let gateway = EventGateway::new();
        gateway.attach(Arc::clone(&registry));

        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        let a = registry.register("sub-a", "alice", tx_a);
        let b = registry.register("sub-b", "bob", tx_b);
        registry.join_room(a, "user:alice");
        registry.join_room(b, "user:bob");

        gateway.broadcast_to_user("alice", "progress_updated", serde_json::json!({"n": 1}));

        assert!(matches!(rx_a.try_recv(), Ok(Message::Text(_))));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_to_empty_group_is_not_an_error() {
        let gateway = EventGateway::new();
        gateway.attach(Arc::new(RoomRegistry::new(8)));
        gateway.broadcast_to_group("nobody-here", "group_updated", serde_json::json!({}));
    }
}
