use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use worldsync_core::protocol::ServerMessage;

// ---------------------------------------------------------------------------
// Outbound / LiveSession
// ---------------------------------------------------------------------------

/// Frame queued to a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMessage),
    /// Normal-closure close frame with a human-readable reason.
    Close { reason: String },
}

/// One live WebSocket-backed session. The registry owns the lifecycle; the
/// raw connection only holds the `connection_id` key back into it.
pub struct LiveSession {
    pub session_id: Uuid,
    pub agent_id: Uuid,
    pub connection_id: Uuid,
    pub last_heartbeat: Instant,
    pub subscriptions: HashSet<String>,
    pub sender: mpsc::UnboundedSender<Outbound>,
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Single owner of live-session state: a session map keyed by session id and
/// a connection-id back-reference. All mutation goes through this API, so a
/// session is visible to exactly one connection at a time.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, LiveSession>>,
    connections: RwLock<HashMap<Uuid, Uuid>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly upgraded connection. If the session already had a
    /// connection (client reconnected before the old socket died), the old
    /// connection is closed and displaced.
    pub async fn register(&self, live: LiveSession) {
        let mut sessions = self.sessions.write().await;
        let mut connections = self.connections.write().await;

        if let Some(old) = sessions.remove(&live.session_id) {
            connections.remove(&old.connection_id);
            let _ = old.sender.send(Outbound::Close {
                reason: "session reconnected elsewhere".into(),
            });
        }

        connections.insert(live.connection_id, live.session_id);
        sessions.insert(live.session_id, live);
    }

    /// Resolve a connection to its (session, agent) pair.
    ///
    /// The connections guard is released before the sessions map is read;
    /// holding both at once here would invert the sessions-then-connections
    /// lock order the write paths use.
    pub async fn lookup_connection(&self, connection_id: Uuid) -> Option<(Uuid, Uuid)> {
        let session_id = {
            let connections = self.connections.read().await;
            *connections.get(&connection_id)?
        };
        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .map(|live| (live.session_id, live.agent_id))
    }

    /// Refresh a session's liveness stamp. Every inbound message counts as a
    /// heartbeat, not only explicit HEARTBEAT frames.
    pub async fn touch(&self, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(live) => {
                live.last_heartbeat = Instant::now();
                true
            }
            None => false,
        }
    }

    pub async fn subscribe(&self, session_id: Uuid, sync_group: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(live) => {
                live.subscriptions.insert(sync_group.to_string());
                true
            }
            None => false,
        }
    }

    pub async fn unsubscribe(&self, session_id: Uuid, sync_group: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(live) => live.subscriptions.remove(sync_group),
            None => false,
        }
    }

    /// Notify every session subscribed to `sync_group` that a tick landed.
    /// Returns the number of sessions notified.
    pub async fn broadcast_tick(&self, sync_group: &str, tick_number: i64) -> usize {
        let sessions = self.sessions.read().await;
        let mut notified = 0;
        for live in sessions.values() {
            if live.subscriptions.contains(sync_group) {
                let message = ServerMessage::TickNotification {
                    sync_group: sync_group.to_string(),
                    tick_number,
                };
                if live.sender.send(Outbound::Message(message)).is_ok() {
                    notified += 1;
                }
            }
        }
        notified
    }

    /// Sessions whose last heartbeat is older than `older_than`.
    pub async fn stale_sessions(&self, older_than: Duration) -> Vec<Uuid> {
        let Some(cutoff) = Instant::now().checked_sub(older_than) else {
            return Vec::new();
        };
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|live| live.last_heartbeat < cutoff)
            .map(|live| live.session_id)
            .collect()
    }

    /// Remove by connection id (the disconnect path). Idempotent: a second
    /// removal of the same connection returns None and changes nothing.
    pub async fn remove_by_connection(&self, connection_id: Uuid) -> Option<LiveSession> {
        let mut sessions = self.sessions.write().await;
        let mut connections = self.connections.write().await;
        let session_id = connections.remove(&connection_id)?;
        sessions.remove(&session_id)
    }

    /// Close one session with a reason and drop it from both maps.
    pub async fn close_session(&self, session_id: Uuid, reason: &str) -> Option<LiveSession> {
        let mut sessions = self.sessions.write().await;
        let mut connections = self.connections.write().await;
        let live = sessions.remove(&session_id)?;
        connections.remove(&live.connection_id);
        let _ = live.sender.send(Outbound::Close {
            reason: reason.to_string(),
        });
        Some(live)
    }

    /// Close every live connection and clear both maps (process shutdown).
    pub async fn close_all(&self, reason: &str) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut connections = self.connections.write().await;
        let count = sessions.len();
        for live in sessions.values() {
            let _ = live.sender.send(Outbound::Close {
                reason: reason.to_string(),
            });
        }
        sessions.clear();
        connections.clear();
        count
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
