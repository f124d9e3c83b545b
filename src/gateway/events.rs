//! Wire protocol frames for the realtime gateway
//!
//! JSON text frames, tagged by `type`. Domain events (group updates, posted
//! messages, news/exam broadcasts) all travel in the generic `event` frame;
//! the envelope is fixed, the payload is the event's own shape.

use serde::{Deserialize, Serialize};

/// Frames sent by clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame on every connection; carries the credential
    Authenticate { token: String },
    /// Subscribe to a group room; membership is re-validated
    JoinRoom { group_id: String },
    /// Unsubscribe from a group room; always allowed
    LeaveRoom { group_id: String },
}

/// Frames sent by the server
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake succeeded; lists the rooms auto-joined
    Authenticated { user_id: String, rooms: Vec<String> },
    RoomJoined { room: String },
    RoomLeft { room: String },
    /// Domain event fan-out
    Event {
        event: String,
        payload: serde_json::Value,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

impl ServerMessage {
    pub fn event(event: &str, payload: serde_json::Value) -> Self {
        ServerMessage::Event {
            event: event.to_string(),
            payload,
        }
    }

    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }
}

/// Room name for a group's broadcast channel
pub fn group_room(group_id: &str) -> String {
    format!("group:{group_id}")
}

/// Room name for a user's personal channel
pub fn user_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_naming() {
        assert_eq!(group_room("g-1"), "group:g-1");
        assert_eq!(user_room("u-1"), "user:u-1");
    }

    #[test]
    fn test_client_frame_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"authenticate","token":"abc"}"#).expect("parse");
        assert!(matches!(msg, ClientMessage::Authenticate { token } if token == "abc"));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","group_id":"g-1"}"#).expect("parse");
        assert!(matches!(msg, ClientMessage::JoinRoom { group_id } if group_id == "g-1"));
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"shout","text":"hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_frame_shape() {
        let frame = ServerMessage::event("news_broadcast", serde_json::json!({"title": "hi"}));
        let text = serde_json::to_string(&frame).expect("serialize");
        assert!(text.contains(r#""type":"event""#));
        assert!(text.contains(r#""event":"news_broadcast""#));
    }
}
