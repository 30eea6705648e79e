use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use worldsync_core::config::WorldConfig;
use worldsync_core::token::{sign_token, SessionClaims};
use worldsync_core::types::{SessionRecord, SyncGroup};
use worldsync_server::build_router;
use worldsync_server::state::AppState;
use worldsync_server::store::mem::MemStore;
use worldsync_server::store::WorldStore;

const SECRET: &str = "integration-secret";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_app(store: Arc<MemStore>) -> axum::Router {
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
    build_router(state)
}

/// Seed one active session and return (store, session_id, agent_id, token).
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

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str, bearer: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut builder = axum::http::Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let response = app
        .oneshot(builder.body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request via `oneshot` and return (status, parsed JSON body).
async fn post(app: axum::Router, uri: &str, bearer: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut builder = axum::http::Request::builder().method("POST").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let response = app
        .oneshot(builder.body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ---------------------------------------------------------------------------
// /api/auth/session/validate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_without_header_is_401() {
    let (store, _, _, _) = seeded_store();
    let (status, body) = get(test_app(store), "/api/auth/session/validate", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn validate_with_valid_token_returns_identity() {
    let (store, session_id, agent_id, token) = seeded_store();
    let (status, body) = get(test_app(store), "/api/auth/session/validate", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["isValid"], true);
    assert_eq!(body["data"]["agentId"], agent_id.to_string());
    assert_eq!(body["data"]["sessionId"], session_id.to_string());
}

#[tokio::test]
async fn validate_with_inactive_session_is_200_success_false() {
    let (store, session_id, _, token) = seeded_store();
    store.invalidate_session(session_id).await.unwrap();
    let (status, body) = get(test_app(store), "/api/auth/session/validate", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn validate_with_malformed_token_never_queries_the_store() {
    let (store, _, _, _) = seeded_store();
    let (status, body) = get(
        test_app(Arc::clone(&store)),
        "/api/auth/session/validate",
        Some("not-a-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(store.session_lookup_count(), 0);
}

// ---------------------------------------------------------------------------
// /api/auth/session/logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logout_without_header_is_401() {
    let (store, _, _, _) = seeded_store();
    let (status, body) = post(test_app(store), "/api/auth/session/logout", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let (store, session_id, _, token) = seeded_store();
    let (status, body) = post(
        test_app(Arc::clone(&store)),
        "/api/auth/session/logout",
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["timestamp"].is_i64());

    let session = store.get_session(session_id).await.unwrap().unwrap();
    assert!(!session.is_active);
}

#[tokio::test]
async fn logout_is_idempotent() {
    let (store, _, _, token) = seeded_store();

    let (status, body) = post(
        test_app(Arc::clone(&store)),
        "/api/auth/session/logout",
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // Second logout with the same (now-dead) token: still success.
    let (status, body) = post(
        test_app(Arc::clone(&store)),
        "/api/auth/session/logout",
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn logout_with_garbage_token_still_succeeds() {
    let (store, _, _, _) = seeded_store();
    let (status, body) = post(
        test_app(store),
        "/api/auth/session/logout",
        Some("garbage"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

// ---------------------------------------------------------------------------
// /stats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stats_reports_connections_and_sync_groups() {
    let (store, _, _, _) = seeded_store();
    let (status, body) = get(test_app(store), "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connections"], 0);
    assert!(body["uptimeS"].is_u64() || body["uptimeS"].is_i64());
    assert!(body["syncGroups"].is_object());
}
