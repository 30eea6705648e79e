use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;

use crate::error::AppError;
use crate::state::AppState;

/// Pull the bearer token out of the Authorization header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// GET /api/auth/session/validate — stateless token check.
///
/// Missing header is the only hard 401; everything else is a 200 with a
/// discriminated success/error body.
pub async fn validate_session(
    State(app): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "success": false, "error": "No token provided" })),
        );
    };

    let identity = app.validator.validate(token).await;
    if identity.is_valid {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "data": {
                    "isValid": true,
                    "agentId": identity.agent_id,
                    "sessionId": identity.session_id,
                }
            })),
        )
    } else {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "success": false, "error": "Invalid session token" })),
        )
    }
}

/// POST /api/auth/session/logout — invalidate the token's session.
///
/// Idempotent: an expired token or an already-inactive session still gets
/// `success: true`, because the end state ("no active session") holds either
/// way. Only a missing header is a 401.
pub async fn logout_session(
    State(app): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let Some(token) = bearer_token(&headers) else {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "success": false, "error": "No token provided" })),
        ));
    };

    if let Ok(claims) = app.validator.decode(token) {
        // A dead session row is fine; a persistence failure is not.
        let invalidated = app.store.invalidate_session(claims.session_id).await?;
        if invalidated {
            tracing::debug!(session_id = %claims.session_id, "session logged out");
        }
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "timestamp": Utc::now().timestamp_millis(),
        })),
    ))
}
