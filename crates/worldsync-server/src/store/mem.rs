//! In-memory `WorldStore` backend.
//!
//! Used by the test suites and handy for local development without a
//! database. The claim path performs its check-and-set inside one lock
//! acquisition, mirroring the single conditional UPDATE the Postgres
//! functions use — at most one concurrent claimant can win.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use worldsync_core::config::WorldConfig;
use worldsync_core::types::{ActionStatus, SessionRecord, SyncGroup, TickRecord};
use worldsync_core::{Result, WorldError};

use super::{SweepReport, WorldStore};

/// Horizon after which an unclaimed PENDING action is expired by the sweep.
const PENDING_STALE_HOURS: i64 = 24;

#[derive(Debug, Clone)]
struct MemMutation {
    allowed_roles: HashSet<String>,
}

#[derive(Debug, Clone)]
struct MemAction {
    mutation_id: Uuid,
    status: ActionStatus,
    claimed_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    last_heartbeat: Option<DateTime<Utc>>,
    timeout: chrono::Duration,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, SessionRecord>,
    roles: HashMap<Uuid, HashSet<String>>,
    mutations: HashMap<Uuid, MemMutation>,
    actions: HashMap<Uuid, MemAction>,
    entities: Vec<serde_json::Value>,
    tick_numbers: HashMap<String, i64>,
}

pub struct MemStore {
    inner: Mutex<Inner>,
    sync_groups: Vec<SyncGroup>,
    config: WorldConfig,
    session_lookups: AtomicUsize,
    /// Artificial latency applied to the next `capture_tick` call only.
    capture_delay: Mutex<Option<Duration>>,
    /// Capture invocation instants, for tick-cadence assertions.
    capture_log: Mutex<Vec<(String, tokio::time::Instant)>>,
}

impl MemStore {
    pub fn new(sync_groups: Vec<SyncGroup>, config: WorldConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            sync_groups,
            config,
            session_lookups: AtomicUsize::new(0),
            capture_delay: Mutex::new(None),
            capture_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            vec![SyncGroup {
                group_name: "public.NORMAL".into(),
                tick_rate_ms: 50,
            }],
            WorldConfig::default(),
        )
    }

    // -- test fixtures ------------------------------------------------------

    pub fn insert_session(&self, session: SessionRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(session.session_id, session);
    }

    pub fn grant_role(&self, agent_id: Uuid, role: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.roles.entry(agent_id).or_default().insert(role.to_string());
    }

    pub fn insert_mutation(&self, mutation_id: Uuid, allowed_roles: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.mutations.insert(
            mutation_id,
            MemMutation {
                allowed_roles: allowed_roles.iter().map(|r| r.to_string()).collect(),
            },
        );
    }

    pub fn insert_pending_action(&self, action_id: Uuid, mutation_id: Uuid, timeout: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.actions.insert(
            action_id,
            MemAction {
                mutation_id,
                status: ActionStatus::Pending,
                claimed_by: None,
                created_at: Utc::now(),
                last_heartbeat: None,
                timeout: chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero()),
            },
        );
    }

    pub fn set_entities(&self, entities: Vec<serde_json::Value>) {
        self.inner.lock().unwrap().entities = entities;
    }

    /// Backdate an action's claim heartbeat, as if the claimant went silent
    /// `age` ago.
    pub fn age_action_heartbeat(&self, action_id: Uuid, age: Duration) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(action) = inner.actions.get_mut(&action_id) {
            action.last_heartbeat =
                Some(Utc::now() - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero()));
        }
    }

    /// Backdate an action's creation, for staleness-horizon tests.
    pub fn age_action_created_at(&self, action_id: Uuid, age: Duration) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(action) = inner.actions.get_mut(&action_id) {
            action.created_at =
                Utc::now() - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero());
        }
    }

    pub fn action_status(&self, action_id: Uuid) -> Option<(ActionStatus, Option<Uuid>)> {
        let inner = self.inner.lock().unwrap();
        inner
            .actions
            .get(&action_id)
            .map(|a| (a.status, a.claimed_by))
    }

    /// Number of `get_session` calls the store has served.
    pub fn session_lookup_count(&self) -> usize {
        self.session_lookups.load(Ordering::SeqCst)
    }

    /// Delay the next capture by `delay` (one-shot).
    pub fn delay_next_capture(&self, delay: Duration) {
        *self.capture_delay.lock().unwrap() = Some(delay);
    }

    /// Instants at which `capture_tick` was invoked, in order.
    pub fn capture_instants(&self) -> Vec<(String, tokio::time::Instant)> {
        self.capture_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorldStore for MemStore {
    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().unwrap();
        Ok(inner.sessions.get(&session_id).cloned())
    }

    async fn touch_session(&self, session_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.get_mut(&session_id) {
            Some(session) if session.is_active => {
                session.last_heartbeat = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn invalidate_session(&self, session_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.get_mut(&session_id) {
            Some(session) if session.is_active => {
                session.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn load_sync_groups(&self) -> Result<Vec<SyncGroup>> {
        Ok(self.sync_groups.clone())
    }

    async fn load_world_config(&self) -> Result<WorldConfig> {
        Ok(self.config.clone())
    }

    async fn capture_tick(&self, sync_group: &str) -> Result<TickRecord> {
        self.capture_log
            .lock()
            .unwrap()
            .push((sync_group.to_string(), tokio::time::Instant::now()));

        let delay = self.capture_delay.lock().unwrap().take();
        let started = tokio::time::Instant::now();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let group = self
            .sync_groups
            .iter()
            .find(|g| g.group_name == sync_group)
            .ok_or_else(|| WorldError::SyncGroupNotFound(sync_group.to_string()))?;

        let mut inner = self.inner.lock().unwrap();
        let tick_number = inner
            .tick_numbers
            .entry(sync_group.to_string())
            .and_modify(|n| *n += 1)
            .or_insert(1);
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(TickRecord {
            sync_group: sync_group.to_string(),
            tick_number: *tick_number,
            captured_at: Utc::now(),
            duration_ms,
            is_delayed: duration_ms > group.tick_rate_ms as f64,
            entity_states: inner.entities.len() as i64,
            metadata_states: 0,
        })
    }

    async fn try_claim_action(&self, action_id: Uuid, agent_id: Uuid) -> Result<bool> {
        // Single locked check-and-set: the in-memory analogue of the
        // conditional UPDATE in try_claim_action().
        let mut inner = self.inner.lock().unwrap();

        let allowed = match inner.actions.get(&action_id) {
            Some(action) => {
                let agent_roles = inner.roles.get(&agent_id);
                let mutation = inner.mutations.get(&action.mutation_id);
                action.status == ActionStatus::Pending
                    && action.claimed_by.is_none()
                    && match (agent_roles, mutation) {
                        (Some(roles), Some(m)) => {
                            roles.iter().any(|r| m.allowed_roles.contains(r))
                        }
                        _ => false,
                    }
            }
            None => false,
        };

        if !allowed {
            return Ok(false);
        }

        let action = inner.actions.get_mut(&action_id).unwrap();
        action.status = ActionStatus::InProgress;
        action.claimed_by = Some(agent_id);
        action.last_heartbeat = Some(Utc::now());
        Ok(true)
    }

    async fn update_action_heartbeat(&self, action_id: Uuid, agent_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.actions.get_mut(&action_id) {
            Some(action)
                if action.status == ActionStatus::InProgress
                    && action.claimed_by == Some(agent_id) =>
            {
                action.last_heartbeat = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sweep_action_timeouts(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let stale_horizon = now - chrono::Duration::hours(PENDING_STALE_HOURS);
        let mut report = SweepReport::default();

        let mut inner = self.inner.lock().unwrap();
        for action in inner.actions.values_mut() {
            match action.status {
                ActionStatus::InProgress => {
                    let expired = action
                        .last_heartbeat
                        .map(|hb| hb + action.timeout < now)
                        .unwrap_or(true);
                    if expired {
                        action.status = ActionStatus::Pending;
                        action.claimed_by = None;
                        action.last_heartbeat = None;
                        report.released += 1;
                    }
                }
                ActionStatus::Pending => {
                    if action.created_at < stale_horizon {
                        action.status = ActionStatus::Expired;
                        report.expired += 1;
                    }
                }
                _ => {}
            }
        }
        Ok(report)
    }

    async fn query_entities(&self, sync_group: Option<&str>) -> Result<serde_json::Value> {
        let inner = self.inner.lock().unwrap();
        let entities: Vec<serde_json::Value> = inner
            .entities
            .iter()
            .filter(|e| match sync_group {
                Some(group) => e.get("syncGroup").and_then(|v| v.as_str()) == Some(group),
                None => true,
            })
            .cloned()
            .collect();
        Ok(serde_json::Value::Array(entities))
    }

    async fn close(&self) {}
}
