use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use worldsync_core::types::SyncGroup;

use crate::registry::SessionRegistry;
use crate::store::WorldStore;

// ---------------------------------------------------------------------------
// TickStats
// ---------------------------------------------------------------------------

/// Rolling per-group counters exposed on the stats endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickStats {
    pub tick_count: u64,
    pub last_tick_number: i64,
    pub last_duration_ms: f64,
    pub last_delayed: bool,
    pub capture_failures: u64,
}

pub type TickStatsMap = Arc<RwLock<HashMap<String, TickStats>>>;

// ---------------------------------------------------------------------------
// TickManager
// ---------------------------------------------------------------------------

/// Runs one authoritative capture loop per sync group.
///
/// Each loop is a self-correcting fixed-interval timer: the next deadline is
/// advanced by exactly the tick rate before capture work starts, so a slow
/// tick delays at most itself and the cadence recovers on the next cycle.
/// Groups are independent failure domains; a capture error in one never
/// stops another.
pub struct TickManager {
    store: Arc<dyn WorldStore>,
    registry: Arc<SessionRegistry>,
    groups: Vec<SyncGroup>,
    stats: TickStatsMap,
    stop_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TickManager {
    pub fn new(
        store: Arc<dyn WorldStore>,
        registry: Arc<SessionRegistry>,
        groups: Vec<SyncGroup>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            store,
            registry,
            groups,
            stats: Arc::new(RwLock::new(HashMap::new())),
            stop_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn stats(&self) -> TickStatsMap {
        Arc::clone(&self.stats)
    }

    /// Spawn one capture loop per configured sync group.
    pub fn start(&self) {
        let mut handles = self.handles.lock().unwrap();
        for group in &self.groups {
            tracing::info!(
                sync_group = %group.group_name,
                tick_rate_ms = group.tick_rate_ms,
                "starting tick loop"
            );
            handles.push(tokio::spawn(tick_loop(
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
                group.clone(),
                Arc::clone(&self.stats),
                self.stop_tx.subscribe(),
            )));
        }
    }

    /// Signal every loop to exit after its current cycle. In-flight captures
    /// complete but drive no further work. Safe to call more than once.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop all loops, wait for them to drain, and release the store.
    pub async fn cleanup(&self) {
        self.stop();
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
        self.store.close().await;
    }
}

async fn tick_loop(
    store: Arc<dyn WorldStore>,
    registry: Arc<SessionRegistry>,
    group: SyncGroup,
    stats: TickStatsMap,
    mut stop_rx: watch::Receiver<bool>,
) {
    let tick_rate = Duration::from_millis(group.tick_rate_ms);
    let mut next_deadline = Instant::now();

    loop {
        if *stop_rx.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(next_deadline) => {}
            _ = stop_rx.changed() => continue,
        }

        // Advance the target before any capture work; a slow tick must not
        // push later ticks off cadence.
        next_deadline += tick_rate;

        let handler_started = Instant::now();
        let capture = store.capture_tick(&group.group_name).await;
        let db_elapsed = handler_started.elapsed();

        match capture {
            Ok(tick) => {
                registry
                    .broadcast_tick(&group.group_name, tick.tick_number)
                    .await;

                {
                    let mut stats = stats.write().await;
                    let entry = stats.entry(group.group_name.clone()).or_default();
                    entry.tick_count += 1;
                    entry.last_tick_number = tick.tick_number;
                    entry.last_duration_ms = tick.duration_ms;
                    entry.last_delayed = tick.is_delayed;
                }

                // Three independent delay signals; any of them tripping is a
                // performance warning, never a loop-stopping error.
                let total_elapsed = handler_started.elapsed();
                if total_elapsed > tick_rate || db_elapsed > tick_rate || tick.is_delayed {
                    tracing::warn!(
                        sync_group = %group.group_name,
                        tick_number = tick.tick_number,
                        total_ms = total_elapsed.as_secs_f64() * 1000.0,
                        db_ms = db_elapsed.as_secs_f64() * 1000.0,
                        server_delayed = tick.is_delayed,
                        tick_rate_ms = group.tick_rate_ms,
                        "tick exceeded its rate"
                    );
                }
            }
            Err(err) => {
                let mut stats = stats.write().await;
                stats
                    .entry(group.group_name.clone())
                    .or_default()
                    .capture_failures += 1;
                tracing::warn!(
                    sync_group = %group.group_name,
                    error = %err,
                    "tick capture failed; continuing"
                );
            }
        }
    }

    tracing::debug!(sync_group = %group.group_name, "tick loop stopped");
}
