use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /stats — process uptime, live connection count, and per-sync-group
/// tick counters.
pub async fn get_stats(State(app): State<AppState>) -> Json<serde_json::Value> {
    let ticks = app.tick_stats.read().await.clone();
    Json(serde_json::json!({
        "uptimeS": app.started_at.elapsed().as_secs(),
        "connections": app.registry.count().await,
        "syncGroups": ticks,
    }))
}
