use std::sync::Arc;
use std::time::Instant;

use worldsync_core::config::WorldConfig;
use worldsync_core::types::SyncGroup;

use crate::registry::SessionRegistry;
use crate::store::WorldStore;
use crate::tick::TickStatsMap;
use crate::validator::SessionValidator;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WorldStore>,
    pub registry: Arc<SessionRegistry>,
    pub validator: Arc<SessionValidator>,
    pub config: Arc<WorldConfig>,
    pub sync_groups: Arc<Vec<SyncGroup>>,
    pub tick_stats: TickStatsMap,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn WorldStore>,
        token_secret: &str,
        config: WorldConfig,
        sync_groups: Vec<SyncGroup>,
        tick_stats: TickStatsMap,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let validator = Arc::new(SessionValidator::new(token_secret, Arc::clone(&store)));
        Self {
            store,
            registry,
            validator,
            config: Arc::new(config),
            sync_groups: Arc::new(sync_groups),
            tick_stats,
            started_at: Instant::now(),
        }
    }
}
