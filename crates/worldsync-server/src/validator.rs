use std::sync::Arc;

use uuid::Uuid;

use worldsync_core::token::{decode_token, SessionClaims};
use worldsync_core::types::SessionIdentity;
use worldsync_core::Result;

use crate::store::WorldStore;

/// Verifies signed session tokens against the persistence layer.
///
/// `validate` never returns an error: decode failures, store failures, and
/// dead sessions all collapse to the invalid identity. Authentication
/// failures are routine, so they log at debug only.
pub struct SessionValidator {
    secret: String,
    store: Arc<dyn WorldStore>,
}

impl SessionValidator {
    pub fn new(secret: impl Into<String>, store: Arc<dyn WorldStore>) -> Self {
        Self {
            secret: secret.into(),
            store,
        }
    }

    /// Decode a token without consulting persistence. Used by logout, which
    /// only needs the session id the token points at.
    pub fn decode(&self, token: &str) -> Result<SessionClaims> {
        decode_token(token, &self.secret)
    }

    /// Full validation: decode locally, then confirm the session row is
    /// alive server-side. Malformed tokens never reach the store.
    pub async fn validate(&self, token: &str) -> SessionIdentity {
        let claims = match decode_token(token, &self.secret) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "token rejected before persistence lookup");
                return SessionIdentity::invalid();
            }
        };

        match self.store.get_session(claims.session_id).await {
            Ok(Some(session)) if session.is_active && session.agent_id == claims.agent_id => {
                SessionIdentity::valid(session.agent_id, session.session_id)
            }
            Ok(_) => {
                tracing::debug!(session_id = %claims.session_id, "session missing or inactive");
                SessionIdentity::invalid()
            }
            Err(err) => {
                tracing::debug!(session_id = %claims.session_id, error = %err, "session lookup failed");
                SessionIdentity::invalid()
            }
        }
    }

    /// Liveness re-check by session id, used by the heartbeat supervisor.
    pub async fn session_still_valid(&self, session_id: Uuid) -> bool {
        matches!(
            self.store.get_session(session_id).await,
            Ok(Some(session)) if session.is_active
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use worldsync_core::token::sign_token;
    use worldsync_core::types::SessionRecord;

    use crate::store::mem::MemStore;

    const SECRET: &str = "validator-secret";

    fn seeded() -> (Arc<MemStore>, Uuid, Uuid, String) {
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
        let token =
            sign_token(&SessionClaims::new(session_id, agent_id, 60_000), SECRET).unwrap();
        (store, session_id, agent_id, token)
    }

    #[tokio::test]
    async fn valid_token_yields_identity() {
        let (store, session_id, agent_id, token) = seeded();
        let validator = SessionValidator::new(SECRET, store);

        let identity = validator.validate(&token).await;
        assert!(identity.is_valid);
        assert_eq!(identity.agent_id, agent_id.to_string());
        assert_eq!(identity.session_id, session_id.to_string());
    }

    #[tokio::test]
    async fn malformed_token_never_touches_the_store() {
        let (store, _, _, _) = seeded();
        let validator = SessionValidator::new(SECRET, Arc::clone(&store) as Arc<dyn WorldStore>);

        for bad in ["", "garbage", "one.two", "a.b.c.d"] {
            let identity = validator.validate(bad).await;
            assert_eq!(identity, SessionIdentity::invalid());
        }
        assert_eq!(store.session_lookup_count(), 0);
    }

    #[tokio::test]
    async fn inactive_session_is_invalid() {
        let (store, session_id, _, token) = seeded();
        store.invalidate_session(session_id).await.unwrap();
        let validator = SessionValidator::new(SECRET, store);

        assert_eq!(validator.validate(&token).await, SessionIdentity::invalid());
    }

    #[tokio::test]
    async fn unknown_session_is_invalid() {
        let store = Arc::new(MemStore::with_defaults());
        let token = sign_token(
            &SessionClaims::new(Uuid::new_v4(), Uuid::new_v4(), 60_000),
            SECRET,
        )
        .unwrap();
        let validator = SessionValidator::new(SECRET, store);

        assert_eq!(validator.validate(&token).await, SessionIdentity::invalid());
    }

    #[tokio::test]
    async fn agent_mismatch_is_invalid() {
        let (store, session_id, _, _) = seeded();
        // Token signed for the right session but the wrong agent.
        let token = sign_token(
            &SessionClaims::new(session_id, Uuid::new_v4(), 60_000),
            SECRET,
        )
        .unwrap();
        let validator = SessionValidator::new(SECRET, store);

        assert_eq!(validator.validate(&token).await, SessionIdentity::invalid());
    }

    #[tokio::test]
    async fn session_still_valid_tracks_active_flag() {
        let (store, session_id, _, _) = seeded();
        let validator = SessionValidator::new(SECRET, Arc::clone(&store) as Arc<dyn WorldStore>);

        assert!(validator.session_still_valid(session_id).await);
        store.invalidate_session(session_id).await.unwrap();
        assert!(!validator.session_still_valid(session_id).await);
    }
}
