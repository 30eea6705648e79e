use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SyncGroup
// ---------------------------------------------------------------------------

/// A named cadence bucket. Every entity and session belongs to exactly one
/// sync group, which determines how often its authoritative state is captured.
///
/// Loaded once at startup from `auth.sync_groups`; immutable for the life of
/// the process (changing tick rates requires a restart).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncGroup {
    pub group_name: String,
    pub tick_rate_ms: u64,
}

// ---------------------------------------------------------------------------
// TickRecord
// ---------------------------------------------------------------------------

/// One authoritative state-capture cycle for a sync group, as returned by the
/// `capture_tick_state` database function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickRecord {
    pub sync_group: String,
    pub tick_number: i64,
    pub captured_at: DateTime<Utc>,
    /// Wall time the capture function spent inside the database, in ms.
    pub duration_ms: f64,
    /// Set by the capture function when its own elapsed time exceeded the
    /// group's tick rate.
    pub is_delayed: bool,
    /// Entity state rows recorded for this tick.
    pub entity_states: i64,
    /// Entity metadata rows recorded for this tick.
    pub metadata_states: i64,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Persistence-side session row (`auth.agent_sessions`). The in-memory
/// session registry is only a liveness cache over these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub agent_id: Uuid,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub is_active: bool,
}

/// Outcome of validating a session token. All failure paths collapse to the
/// invalid identity; callers never see an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub agent_id: String,
    pub session_id: String,
    pub is_valid: bool,
}

impl SessionIdentity {
    pub fn invalid() -> Self {
        Self {
            agent_id: String::new(),
            session_id: String::new(),
            is_valid: false,
        }
    }

    pub fn valid(agent_id: Uuid, session_id: Uuid) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            session_id: session_id.to_string(),
            is_valid: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Action / Mutation
// ---------------------------------------------------------------------------

/// Lifecycle of a claimable unit of work. `Pending` and `InProgress` are the
/// only live states; the remaining four are terminal and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "PENDING",
            ActionStatus::InProgress => "IN_PROGRESS",
            ActionStatus::Completed => "COMPLETED",
            ActionStatus::Failed => "FAILED",
            ActionStatus::Expired => "EXPIRED",
            ActionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Pending | ActionStatus::InProgress)
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = crate::WorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ActionStatus::Pending),
            "IN_PROGRESS" => Ok(ActionStatus::InProgress),
            "COMPLETED" => Ok(ActionStatus::Completed),
            "FAILED" => Ok(ActionStatus::Failed),
            "EXPIRED" => Ok(ActionStatus::Expired),
            "CANCELLED" => Ok(ActionStatus::Cancelled),
            other => Err(crate::WorldError::InvalidActionStatus(other.to_string())),
        }
    }
}

/// Operation class of an immutable mutation definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationType {
    Insert,
    Update,
    Delete,
}

/// A claimable unit of work derived from a mutation definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub action_id: Uuid,
    pub mutation_id: Uuid,
    pub status: ActionStatus,
    pub claimed_by: Option<Uuid>,
    pub target_entities: Vec<Uuid>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub timeout_duration_ms: u64,
}
