use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{Result, WorldError};

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

// ---------------------------------------------------------------------------
// SessionClaims
// ---------------------------------------------------------------------------

/// Claims carried by a signed session token: who the agent is, which session
/// row backs it, and the issue/expiry instants (unix seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub session_id: Uuid,
    pub agent_id: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// Claims for a new session expiring `ttl_ms` from now.
    pub fn new(session_id: Uuid, agent_id: Uuid, ttl_ms: u64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::milliseconds(ttl_ms as i64);
        Self {
            session_id,
            agent_id,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Sign claims into the compact three-segment form
/// `base64url(header).base64url(claims).base64url(hmac-sha256)`.
pub fn sign_token(claims: &SessionClaims, secret: &str) -> Result<String> {
    let header = URL_SAFE_NO_PAD.encode(HEADER);
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{header}.{body}");

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WorldError::InvalidTokenSignature)?;
    mac.update(signing_input.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{sig}"))
}

/// Decode and verify a session token.
///
/// The segment-count check runs before any crypto or JSON work so that
/// obviously malformed input is rejected for free. Signature is verified
/// before the claims are parsed; expiry is checked last.
pub fn decode_token(token: &str, secret: &str) -> Result<SessionClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(WorldError::MalformedToken);
    }

    let signing_input = format!("{}.{}", segments[0], segments[1]);
    let sig = URL_SAFE_NO_PAD
        .decode(segments[2])
        .map_err(|_| WorldError::MalformedToken)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WorldError::InvalidTokenSignature)?;
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&sig)
        .map_err(|_| WorldError::InvalidTokenSignature)?;

    let body = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|_| WorldError::MalformedToken)?;
    let claims: SessionClaims = serde_json::from_slice(&body)?;

    if claims.is_expired() {
        return Err(WorldError::TokenExpired);
    }

    Ok(claims)
}
