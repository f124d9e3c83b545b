//! Connection and room registry
//!
//! Tracks live gateway connections and their room subscriptions. This is the
//! one piece of shared mutable core state touched by every connection task
//! concurrently, so everything lives in DashMaps. Fan-out goes through each
//! connection's outbound channel and never suspends; the connection's writer
//! task drains the channel onto the socket.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::events::ServerMessage;

/// Identifier for a live connection
pub type ConnId = u64;

/// Registration for one live connection; discarded on disconnect
struct ConnectionEntry {
    /// External auth subject the connection authenticated as
    #[allow(dead_code)]
    subject_id: String,
    /// Platform user the subject resolved to
    user_id: String,
    /// Outbound frame queue, drained by the connection's writer task
    sender: UnboundedSender<Message>,
    /// Rooms this connection is subscribed to
    rooms: HashSet<String>,
}

/// Thread-safe registry of connections and room subscriptions
pub struct RoomRegistry {
    connections: DashMap<ConnId, ConnectionEntry>,
    rooms: DashMap<String, HashSet<ConnId>>,
    next_id: AtomicU64,
    max_connections: usize,
}

impl RoomRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_connections,
        }
    }

    pub fn is_at_capacity(&self) -> bool {
        self.connections.len() >= self.max_connections
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Register an authenticated connection
    pub fn register(
        &self,
        subject_id: &str,
        user_id: &str,
        sender: UnboundedSender<Message>,
    ) -> ConnId {
        let conn = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.insert(
            conn,
            ConnectionEntry {
                subject_id: subject_id.to_string(),
                user_id: user_id.to_string(),
                sender,
                rooms: HashSet::new(),
            },
        );
        debug!(conn, user = user_id, "Registry: connection registered");
        conn
    }

    /// Discard a connection's registration and all its room subscriptions
    pub fn deregister(&self, conn: ConnId) {
        if let Some((_, entry)) = self.connections.remove(&conn) {
            for room in &entry.rooms {
                self.drop_from_room(conn, room);
            }
            debug!(conn, user = %entry.user_id, "Registry: connection deregistered");
        }
    }

    /// Subscribe a connection to a room; `false` if the connection is gone
    pub fn join_room(&self, conn: ConnId, room: &str) -> bool {
        let known = match self.connections.get_mut(&conn) {
            Some(mut entry) => {
                entry.rooms.insert(room.to_string());
                true
            }
            None => false,
        };

        if known {
            self.rooms.entry(room.to_string()).or_default().insert(conn);
            debug!(conn, room, "Registry: joined room");
        }
        known
    }

    /// Unsubscribe a connection from a room; unconditional
    pub fn leave_room(&self, conn: ConnId, room: &str) {
        if let Some(mut entry) = self.connections.get_mut(&conn) {
            entry.rooms.remove(room);
        }
        self.drop_from_room(conn, room);
        debug!(conn, room, "Registry: left room");
    }

    fn drop_from_room(&self, conn: ConnId, room: &str) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(&conn);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }

    /// Rooms a connection is currently subscribed to
    pub fn rooms_of(&self, conn: ConnId) -> Vec<String> {
        self.connections
            .get(&conn)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Queue a frame for one connection
    pub fn send_to_conn(&self, conn: ConnId, message: &ServerMessage) -> bool {
        let Ok(text) = serde_json::to_string(message) else {
            return false;
        };
        self.connections
            .get(&conn)
            .map(|entry| entry.sender.send(Message::Text(text)).is_ok())
            .unwrap_or(false)
    }

    /// Queue a frame for every connection subscribed to a room.
    ///
    /// Returns the number of recipients; an unknown or empty room delivers to
    /// zero, which is not an error.
    pub fn send_to_room(&self, room: &str, message: &ServerMessage) -> usize {
        let Ok(text) = serde_json::to_string(message) else {
            return 0;
        };

        let targets: Vec<ConnId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for conn in targets {
            if let Some(entry) = self.connections.get(&conn) {
                if entry.sender.send(Message::Text(text.clone())).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Queue a frame for every connection, regardless of rooms
    pub fn send_to_all(&self, message: &ServerMessage) -> usize {
        let Ok(text) = serde_json::to_string(message) else {
            return 0;
        };

        let mut delivered = 0;
        for entry in self.connections.iter() {
            if entry.sender.send(Message::Text(text.clone())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn connect(registry: &RoomRegistry, user: &str) -> (ConnId, UnboundedReceiver<Message>) {
        let (tx, rx) = unbounded_channel();
        let conn = registry.register(&format!("sub-{user}"), user, tx);
        (conn, rx)
    }

    fn received_events(rx: &mut UnboundedReceiver<Message>) -> Vec<String> {
        let mut events = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&text).expect("frame json");
            if value["type"] == "event" {
                events.push(value["event"].as_str().unwrap_or_default().to_string());
            }
        }
        events
    }

    #[test]
    fn test_room_isolation() {
        let registry = RoomRegistry::new(64);
        let (a, mut rx_a) = connect(&registry, "alice");
        let (b, mut rx_b) = connect(&registry, "bob");

        registry.join_room(a, "group:A");
        registry.join_room(b, "group:B");

        let delivered = registry.send_to_room(
            "group:A",
            &ServerMessage::event("message_posted", serde_json::json!({})),
        );

        assert_eq!(delivered, 1);
        assert_eq!(received_events(&mut rx_a), vec!["message_posted"]);
        assert!(received_events(&mut rx_b).is_empty());
    }

    #[test]
    fn test_broadcast_to_all_ignores_rooms() {
        let registry = RoomRegistry::new(64);
        let (_a, mut rx_a) = connect(&registry, "alice");
        let (b, mut rx_b) = connect(&registry, "bob");
        registry.join_room(b, "group:B");

        let delivered =
            registry.send_to_all(&ServerMessage::event("news_broadcast", serde_json::json!({})));

        assert_eq!(delivered, 2);
        assert_eq!(received_events(&mut rx_a), vec!["news_broadcast"]);
        assert_eq!(received_events(&mut rx_b), vec!["news_broadcast"]);
    }

    #[test]
    fn test_deregister_drops_subscriptions() {
        let registry = RoomRegistry::new(64);
        let (a, mut rx_a) = connect(&registry, "alice");
        registry.join_room(a, "group:A");

        registry.deregister(a);

        assert_eq!(registry.connection_count(), 0);
        let delivered = registry.send_to_room(
            "group:A",
            &ServerMessage::event("message_posted", serde_json::json!({})),
        );
        assert_eq!(delivered, 0);
        assert!(received_events(&mut rx_a).is_empty());
    }

    #[test]
    fn test_leave_room_keeps_connection() {
        let registry = RoomRegistry::new(64);
        let (a, mut rx_a) = connect(&registry, "alice");
        registry.join_room(a, "group:A");
        registry.join_room(a, "user:alice");

        registry.leave_room(a, "group:A");

        assert_eq!(
            registry.send_to_room("group:A", &ServerMessage::event("x", serde_json::json!({}))),
            0
        );
        assert_eq!(
            registry.send_to_room(
                "user:alice",
                &ServerMessage::event("y", serde_json::json!({}))
            ),
            1
        );
        assert_eq!(received_events(&mut rx_a), vec!["y"]);
        assert_eq!(registry.rooms_of(a), vec!["user:alice".to_string()]);
    }

    #[test]
    fn test_capacity() {
        let registry = RoomRegistry::new(1);
        assert!(!registry.is_at_capacity());
        let (_a, _rx) = connect(&registry, "alice");
        assert!(registry.is_at_capacity());
    }

    #[test]
    fn test_send_to_unknown_room_is_zero() {
        let registry = RoomRegistry::new(4);
        assert_eq!(
            registry.send_to_room("group:ghost", &ServerMessage::event("x", serde_json::json!({}))),
            0
        );
    }
}
