use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages a connected client may send. The tag is the wire `type` field;
/// anything that fails to parse into one of these arms is answered with an
/// `ERROR` reply and the connection stays open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Heartbeat,
    ConfigRequest,
    Subscribe { sync_group: String },
    Unsubscribe { sync_group: String },
    Query {
        request_id: String,
        #[serde(default)]
        sync_group: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Messages the server sends. `ConnectionEstablished` is always the first
/// message on a fresh connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    ConnectionEstablished { agent_id: String },
    HeartbeatAck,
    ConfigResponse { config: WorldConfig },
    SubscribeAck { sync_group: String, success: bool },
    UnsubscribeAck { sync_group: String, success: bool },
    QueryResponse {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        results: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    TickNotification { sync_group: String, tick_number: i64 },
    Error { message: String },
}
