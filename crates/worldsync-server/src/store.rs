use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use worldsync_core::config::WorldConfig;
use worldsync_core::types::{SessionRecord, SyncGroup, TickRecord};
use worldsync_core::Result;

pub mod mem;
pub mod pg;

/// Outcome of one `handle_action_timeouts` sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// IN_PROGRESS actions whose claim expired and went back to PENDING.
    pub released: u64,
    /// PENDING actions past the staleness horizon, marked EXPIRED.
    pub expired: u64,
}

/// Seam between the server and the persistence layer.
///
/// Every method maps to a single query or stored-procedure call; the claim
/// and sweep operations are atomic on the database side, so callers must not
/// wrap them in read-then-write logic of their own.
#[async_trait]
pub trait WorldStore: Send + Sync {
    /// Fetch a session row by id. `Ok(None)` when no such session exists.
    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>>;

    /// Refresh a session's persistence-side heartbeat. Returns whether the
    /// session was still active.
    async fn touch_session(&self, session_id: Uuid) -> Result<bool>;

    /// Mark a session inactive. Returns whether a live row was affected;
    /// invalidating an absent or already-inactive session is not an error.
    async fn invalidate_session(&self, session_id: Uuid) -> Result<bool>;

    /// Load all sync-group cadence rows. Called once at startup.
    async fn load_sync_groups(&self) -> Result<Vec<SyncGroup>>;

    /// Load the runtime world configuration. Called once at startup.
    async fn load_world_config(&self) -> Result<WorldConfig>;

    /// Run `capture_tick_state` for one sync group inside a transaction and
    /// return the recorded tick.
    async fn capture_tick(&self, sync_group: &str) -> Result<TickRecord>;

    /// Atomic claim attempt (`try_claim_action`). True only when this call
    /// performed the claim.
    async fn try_claim_action(&self, action_id: Uuid, agent_id: Uuid) -> Result<bool>;

    /// Refresh an action claim's heartbeat (`update_action_heartbeat`).
    async fn update_action_heartbeat(&self, action_id: Uuid, agent_id: Uuid) -> Result<bool>;

    /// Release timed-out claims and expire stale pending actions
    /// (`handle_action_timeouts`).
    async fn sweep_action_timeouts(&self) -> Result<SweepReport>;

    /// Read-only entity query, optionally scoped to one sync group.
    async fn query_entities(&self, sync_group: Option<&str>) -> Result<serde_json::Value>;

    /// Release the underlying connection pool. Idempotent.
    async fn close(&self);
}
