use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use worldsync_core::config::WorldConfig;
use worldsync_core::token::{sign_token, SessionClaims};
use worldsync_core::types::{SessionRecord, SyncGroup};
use worldsync_server::build_router;
use worldsync_server::state::AppState;
use worldsync_server::store::mem::MemStore;
use worldsync_server::store::WorldStore;

const SECRET: &str = "ws-e2e-secret";

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bind an ephemeral port, serve the router on it, and return the address.
async fn spawn_server(store: Arc<MemStore>) -> SocketAddr {
    let state = AppState::new(
        store as Arc<dyn WorldStore>,
        SECRET,
        WorldConfig::default(),
        vec![SyncGroup {
            group_name: "public.NORMAL".into(),
            tick_rate_ms: 50,
        }],
        Default::default(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn seeded_store() -> (Arc<MemStore>, Uuid, Uuid, String) {
    let store = Arc::new(MemStore::with_defaults());
    let session_id = Uuid::new_v4();
    let agent_id = Uuid::new_v4();
    store.insert_session(SessionRecord {
        session_id,
        agent_id,
        provider: "system".into(),
        created_at: Utc::now(),
        last_heartbeat: Utc::now(),
        is_active: true,
    });
    let token = sign_token(&SessionClaims::new(session_id, agent_id, 60_000), SECRET).unwrap();
    (store, session_id, agent_id, token)
}

async fn connect(addr: SocketAddr, token: &str) -> WsStream {
    let url = format!("ws://{addr}/world/ws?token={token}");
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

/// Read the next text frame as JSON, with a timeout.
async fn next_json(ws: &mut WsStream) -> serde_json::Value {
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("websocket error");
    match frame {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

// ---------------------------------------------------------------------------
// Upgrade path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_token_receives_connection_established() {
    let (store, _, agent_id, token) = seeded_store();
    let addr = spawn_server(store).await;

    let mut ws = connect(addr, &token).await;
    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "CONNECTION_ESTABLISHED");
    assert_eq!(hello["agentId"], agent_id.to_string());
}

#[tokio::test]
async fn missing_token_is_rejected_before_upgrade() {
    let (store, _, _, _) = seeded_store();
    let addr = spawn_server(store).await;

    let url = format!("ws://{addr}/world/ws");
    let err = tokio_tungstenite::connect_async(url).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn inactive_session_is_rejected_with_invalid_token_body() {
    let (store, session_id, _, token) = seeded_store();
    store.invalidate_session(session_id).await.unwrap();
    let addr = spawn_server(store).await;

    let url = format!("ws://{addr}/world/ws?token={token}");
    let err = tokio_tungstenite::connect_async(url).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
            let body = response.body().as_deref().unwrap_or_default();
            assert_eq!(body, b"Invalid token");
        }
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Message dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_is_acked() {
    let (store, _, _, token) = seeded_store();
    let addr = spawn_server(store).await;

    let mut ws = connect(addr, &token).await;
    next_json(&mut ws).await; // CONNECTION_ESTABLISHED

    send_json(&mut ws, serde_json::json!({"type": "HEARTBEAT"})).await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "HEARTBEAT_ACK");
}

#[tokio::test]
async fn config_request_returns_runtime_config() {
    let (store, _, _, token) = seeded_store();
    let addr = spawn_server(store).await;

    let mut ws = connect(addr, &token).await;
    next_json(&mut ws).await;

    send_json(&mut ws, serde_json::json!({"type": "CONFIG_REQUEST"})).await;
    let response = next_json(&mut ws).await;
    assert_eq!(response["type"], "CONFIG_RESPONSE");
    assert_eq!(response["config"]["heartbeatIntervalMs"], 3000);
}

#[tokio::test]
async fn subscribe_acks_known_group_and_rejects_unknown() {
    let (store, _, _, token) = seeded_store();
    let addr = spawn_server(store).await;

    let mut ws = connect(addr, &token).await;
    next_json(&mut ws).await;

    send_json(
        &mut ws,
        serde_json::json!({"type": "SUBSCRIBE", "syncGroup": "public.NORMAL"}),
    )
    .await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "SUBSCRIBE_ACK");
    assert_eq!(ack["success"], true);

    send_json(
        &mut ws,
        serde_json::json!({"type": "SUBSCRIBE", "syncGroup": "no.SUCH_GROUP"}),
    )
    .await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["success"], false);
}

#[tokio::test]
async fn query_returns_entities_for_the_requested_group() {
    let (store, _, _, token) = seeded_store();
    store.set_entities(vec![
        serde_json::json!({"entityId": "a", "syncGroup": "public.NORMAL"}),
        serde_json::json!({"entityId": "b", "syncGroup": "public.SLOW"}),
    ]);
    let addr = spawn_server(store).await;

    let mut ws = connect(addr, &token).await;
    next_json(&mut ws).await;

    send_json(
        &mut ws,
        serde_json::json!({
            "type": "QUERY",
            "requestId": "q-1",
            "syncGroup": "public.NORMAL",
        }),
    )
    .await;
    let response = next_json(&mut ws).await;
    assert_eq!(response["type"], "QUERY_RESPONSE");
    assert_eq!(response["requestId"], "q-1");
    assert_eq!(response["results"].as_array().unwrap().len(), 1);
    assert!(response.get("error").is_none());
}

#[tokio::test]
async fn malformed_message_gets_error_and_connection_survives() {
    let (store, _, _, token) = seeded_store();
    let addr = spawn_server(store).await;

    let mut ws = connect(addr, &token).await;
    next_json(&mut ws).await;

    send_json(&mut ws, serde_json::json!({"type": "TELEPORT"})).await;
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "ERROR");

    // The connection is still usable after an error reply.
    send_json(&mut ws, serde_json::json!({"type": "HEARTBEAT"})).await;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "HEARTBEAT_ACK");
}

// ---------------------------------------------------------------------------
// Disconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_marks_the_session_inactive() {
    let (store, session_id, _, token) = seeded_store();
    let addr = spawn_server(Arc::clone(&store)).await;

    let mut ws = connect(addr, &token).await;
    next_json(&mut ws).await;
    ws.close(None).await.unwrap();

    // The server finishes its disconnect path asynchronously.
    for _ in 0..50 {
        let session = store.get_session(session_id).await.unwrap().unwrap();
        if !session.is_active {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("session was never marked inactive");
}
