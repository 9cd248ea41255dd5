//! Rivian wire protocol - GraphQL-over-WebSocket frames and BLE constants
//!
//! The subscription endpoint speaks the `graphql-transport-ws` subprotocol:
//! the client sends `connection_init`, waits for `connection_ack`, then
//! issues `subscribe` frames whose ids are echoed back on every `next`.

pub mod ble;

use serde::Serialize;
use serde_json::Value;

/// Subscription endpoint of the consumer GraphQL gateway
pub const GRAPHQL_WEBSOCKET: &str = "wss://api.rivian.com/gql-consumer-subscriptions/graphql";

/// Value sent in the `Sec-WebSocket-Protocol` handshake header
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Close reason the gateway uses when the session token is rejected.
/// A close carrying it must not be retried.
pub const CLOSE_UNAUTHENTICATED: &str = "Unauthenticated";

// Frame types
pub const CONNECTION_INIT: &str = "connection_init";
pub const CONNECTION_ACK: &str = "connection_ack";
pub const SUBSCRIBE: &str = "subscribe";
pub const NEXT: &str = "next";
pub const ERROR: &str = "error";
pub const COMPLETE: &str = "complete";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// Frames sent by the client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<'a> {
    ConnectionInit { payload: &'a Value },
    Subscribe { id: &'a str, payload: &'a Value },
    Complete { id: &'a str },
}

impl ClientMessage<'_> {
    /// Encode as a text frame
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Frames received from the server, classified by their `type` field.
///
/// Only the routing fields are extracted; the frame itself stays a
/// [`Value`] so subscribers see exactly what the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage<'a> {
    ConnectionAck,
    Next { id: &'a str },
    Error { id: Option<&'a str> },
    Complete { id: &'a str },
    Ping,
    Pong,
    Unknown(Option<&'a str>),
}

impl<'a> ServerMessage<'a> {
    pub fn classify(frame: &'a Value) -> Self {
        let kind = frame.get("type").and_then(Value::as_str);
        let id = frame.get("id").and_then(Value::as_str);

        match (kind, id) {
            (Some(CONNECTION_ACK), _) => ServerMessage::ConnectionAck,
            (Some(NEXT), Some(id)) => ServerMessage::Next { id },
            (Some(ERROR), id) => ServerMessage::Error { id },
            (Some(COMPLETE), Some(id)) => ServerMessage::Complete { id },
            (Some(PING), _) => ServerMessage::Ping,
            (Some(PONG), _) => ServerMessage::Pong,
            (kind, _) => ServerMessage::Unknown(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscribe_frame_layout() {
        let payload = json!({"query": "subscription { x }", "variables": {"vehicleID": "v"}});
        let text = ClientMessage::Subscribe {
            id: "abc",
            payload: &payload,
        }
        .to_text()
        .unwrap();

        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            parsed,
            json!({"id": "abc", "type": "subscribe", "payload": payload})
        );
    }

    #[test]
    fn complete_and_init_frames() {
        let text = ClientMessage::Complete { id: "abc" }.to_text().unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!({"id": "abc", "type": "complete"}));

        let payload = json!({"u-sess": "token"});
        let text = ClientMessage::ConnectionInit { payload: &payload }
            .to_text()
            .unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            parsed,
            json!({"type": "connection_init", "payload": {"u-sess": "token"}})
        );
    }

    #[test]
    fn classify_server_frames() {
        let ack = json!({"type": "connection_ack"});
        assert_eq!(ServerMessage::classify(&ack), ServerMessage::ConnectionAck);

        let next = json!({"type": "next", "id": "s1", "payload": {"data": {}}});
        assert_eq!(ServerMessage::classify(&next), ServerMessage::Next { id: "s1" });

        // a data frame without an id cannot be routed
        let orphan = json!({"type": "next", "payload": {}});
        assert_eq!(
            ServerMessage::classify(&orphan),
            ServerMessage::Unknown(Some("next"))
        );

        let error = json!({"type": "error", "id": "s1", "payload": []});
        assert_eq!(
            ServerMessage::classify(&error),
            ServerMessage::Error { id: Some("s1") }
        );

        assert_eq!(ServerMessage::classify(&json!([])), ServerMessage::Unknown(None));
    }
}
