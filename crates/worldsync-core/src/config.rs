use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Runtime configuration loaded once at startup from `config.world_config`.
///
/// These are database rows, not compile-time constants: operators tune tick
/// and heartbeat cadence per deployment. The loaded values are immutable for
/// the life of the process — changing them requires a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldConfig {
    /// How often clients are expected to send a heartbeat.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Supervision sweep cadence; sessions silent for longer than this are
    /// re-validated against persistence and disconnected when invalid.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Hard ceiling on session age enforced by the persistence layer.
    #[serde(default = "default_session_max_age_ms")]
    pub session_max_age_ms: u64,
}

fn default_heartbeat_interval_ms() -> u64 {
    3000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_session_max_age_ms() -> u64 {
    86_400_000
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            session_max_age_ms: default_session_max_age_ms(),
        }
    }
}
