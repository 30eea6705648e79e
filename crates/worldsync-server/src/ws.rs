use std::collections::HashSet;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use worldsync_core::protocol::{ClientMessage, ServerMessage};

use crate::registry::{LiveSession, Outbound};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// GET /world/ws — authenticated WebSocket upgrade.
///
/// The token is validated *before* the protocol upgrade so that a rejection
/// goes out as a plain HTTP 401, not a post-upgrade close frame.
pub async fn ws_handler(
    State(app): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = query.token else {
        return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
    };

    let identity = app.validator.validate(&token).await;
    if !identity.is_valid {
        return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
    }

    // A valid identity always carries well-formed uuids.
    let (Ok(session_id), Ok(agent_id)) = (
        Uuid::parse_str(&identity.session_id),
        Uuid::parse_str(&identity.agent_id),
    ) else {
        return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(app, socket, session_id, agent_id))
}

async fn handle_socket(app: AppState, socket: WebSocket, session_id: Uuid, agent_id: Uuid) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    app.registry
        .register(LiveSession {
            session_id,
            agent_id,
            connection_id,
            last_heartbeat: Instant::now(),
            subscriptions: HashSet::new(),
            sender: tx.clone(),
        })
        .await;
    tracing::debug!(%session_id, %agent_id, "session connected");

    let (mut sink, mut stream) = socket.split();

    // Writer task: drains the outbound queue so that the registry, the tick
    // manager, and this read loop can all send without owning the socket.
    let writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Message(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!(error = %err, "dropping unserializable message");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let _ = tx.send(Outbound::Message(ServerMessage::ConnectionEstablished {
        agent_id: agent_id.to_string(),
    }));

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle_text(&app, connection_id, &tx, text.as_str()).await,
            Message::Close(_) => break,
            // Ping/pong are answered by the protocol layer.
            _ => {}
        }
    }

    // Disconnect: drop the liveness cache entry and mark the persistence row
    // inactive. Both are no-ops if the supervisor got here first.
    if let Some(live) = app.registry.remove_by_connection(connection_id).await {
        if let Err(err) = app.store.invalidate_session(live.session_id).await {
            tracing::debug!(%session_id, error = %err, "could not mark session inactive");
        }
        tracing::debug!(%session_id, "session disconnected");
    }

    drop(tx);
    let _ = writer.await;
}

/// Dispatch one inbound text frame. Every error path answers with a typed
/// `ERROR` message and leaves the connection open.
async fn handle_text(
    app: &AppState,
    connection_id: Uuid,
    tx: &mpsc::UnboundedSender<Outbound>,
    text: &str,
) {
    let reply = |message: ServerMessage| {
        let _ = tx.send(Outbound::Message(message));
    };

    let Some((session_id, _agent_id)) = app.registry.lookup_connection(connection_id).await else {
        reply(ServerMessage::Error {
            message: "unknown connection".into(),
        });
        return;
    };

    // Any inbound traffic proves liveness, not just explicit heartbeats.
    app.registry.touch(session_id).await;

    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(%session_id, error = %err, "malformed message");
            reply(ServerMessage::Error {
                message: "unrecognized or malformed message".into(),
            });
            return;
        }
    };

    match message {
        ClientMessage::Heartbeat => {
            if let Err(err) = app.store.touch_session(session_id).await {
                tracing::debug!(%session_id, error = %err, "persistence heartbeat failed");
            }
            reply(ServerMessage::HeartbeatAck);
        }
        ClientMessage::ConfigRequest => {
            reply(ServerMessage::ConfigResponse {
                config: (*app.config).clone(),
            });
        }
        ClientMessage::Subscribe { sync_group } => {
            let known = app.sync_groups.iter().any(|g| g.group_name == sync_group);
            let success = known && app.registry.subscribe(session_id, &sync_group).await;
            reply(ServerMessage::SubscribeAck {
                sync_group,
                success,
            });
        }
        ClientMessage::Unsubscribe { sync_group } => {
            let success = app.registry.unsubscribe(session_id, &sync_group).await;
            reply(ServerMessage::UnsubscribeAck {
                sync_group,
                success,
            });
        }
        ClientMessage::Query {
            request_id,
            sync_group,
        } => match app.store.query_entities(sync_group.as_deref()).await {
            Ok(results) => reply(ServerMessage::QueryResponse {
                request_id,
                results: Some(results),
                error: None,
            }),
            Err(err) => reply(ServerMessage::QueryResponse {
                request_id,
                results: None,
                error: Some(err.to_string()),
            }),
        },
    }
}
