use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::registry::SessionRegistry;
use crate::store::WorldStore;
use crate::validator::SessionValidator;

/// Interval between `handle_action_timeouts` sweeps when the database has no
/// pg_cron schedule of its own.
pub const ACTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background supervision: WebSocket heartbeat checks and the action-timeout
/// sweep.
///
/// The two timeout domains stay separate on purpose — a silent connection is
/// disconnected, an abandoned action claim is released back to PENDING. Tick
/// delay is the third domain and lives in the tick manager (log-only).
pub struct Supervisor {
    registry: Arc<SessionRegistry>,
    validator: Arc<SessionValidator>,
    store: Arc<dyn WorldStore>,
    check_interval: Duration,
    stop_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(
        registry: Arc<SessionRegistry>,
        validator: Arc<SessionValidator>,
        store: Arc<dyn WorldStore>,
        check_interval: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            registry,
            validator,
            store,
            check_interval,
            stop_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn start(&self) {
        let mut handles = self.handles.lock().unwrap();
        handles.push(tokio::spawn(heartbeat_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.validator),
            self.check_interval,
            self.stop_tx.subscribe(),
        )));
        handles.push(tokio::spawn(action_sweep_loop(
            Arc::clone(&self.store),
            self.stop_tx.subscribe(),
        )));
    }

    /// Stop supervision, close every live connection with a shutdown reason,
    /// and clear the registry. Safe to call more than once.
    pub async fn cleanup(&self) {
        let _ = self.stop_tx.send(true);
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
        let closed = self.registry.close_all("server shutting down").await;
        if closed > 0 {
            tracing::info!(connections = closed, "closed live connections on shutdown");
        }
    }
}

/// Scan all sessions once per check interval. Sessions silent for longer
/// than the interval are re-validated against persistence in parallel;
/// invalid ones are closed with a normal closure and dropped from the map.
async fn heartbeat_loop(
    registry: Arc<SessionRegistry>,
    validator: Arc<SessionValidator>,
    check_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(check_interval) => {}
            _ = stop_rx.changed() => {}
        }
        if *stop_rx.borrow() {
            break;
        }

        let stale = registry.stale_sessions(check_interval).await;
        if stale.is_empty() {
            continue;
        }

        let checks = stale.into_iter().map(|session_id| {
            let registry = Arc::clone(&registry);
            let validator = Arc::clone(&validator);
            async move {
                if !validator.session_still_valid(session_id).await {
                    if registry
                        .close_session(session_id, "session expired")
                        .await
                        .is_some()
                    {
                        tracing::info!(%session_id, "disconnected expired session");
                    }
                }
            }
        });
        join_all(checks).await;
    }
}

/// Server-side fallback for the pg_cron sweep schedule.
async fn action_sweep_loop(store: Arc<dyn WorldStore>, mut stop_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(ACTION_SWEEP_INTERVAL) => {}
            _ = stop_rx.changed() => {}
        }
        if *stop_rx.borrow() {
            break;
        }

        match store.sweep_action_timeouts().await {
            Ok(report) if report.released > 0 || report.expired > 0 => {
                tracing::info!(
                    released = report.released,
                    expired = report.expired,
                    "action timeout sweep"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "action timeout sweep failed; continuing");
            }
        }
    }
}
