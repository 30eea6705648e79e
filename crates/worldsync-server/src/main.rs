use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use worldsync_server::state::AppState;
use worldsync_server::store::pg::PgStore;
use worldsync_server::store::WorldStore;
use worldsync_server::supervisor::Supervisor;
use worldsync_server::tick::TickManager;

#[derive(Parser)]
#[command(
    name = "worldsyncd",
    about = "Authoritative session/tick synchronization server",
    version
)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:3020", env = "WORLD_BIND")]
    bind: String,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// HMAC secret for session tokens
    #[arg(long, env = "WORLD_TOKEN_SECRET")]
    token_secret: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worldsync_server=info,worldsyncd=info".into()),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        tracing::error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    // No partial startup: persistence and configuration must both be
    // reachable or the process exits non-zero.
    let store: Arc<dyn WorldStore> = Arc::new(
        PgStore::connect(&args.database_url)
            .await
            .context("connecting to persistence")?,
    );
    let config = store
        .load_world_config()
        .await
        .context("loading world config")?;
    let sync_groups = store
        .load_sync_groups()
        .await
        .context("loading sync groups")?;
    anyhow::ensure!(!sync_groups.is_empty(), "no sync groups configured");

    tracing::info!(
        sync_groups = sync_groups.len(),
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        "world configuration loaded"
    );

    let mut state = AppState::new(
        Arc::clone(&store),
        &args.token_secret,
        config.clone(),
        sync_groups.clone(),
        Default::default(),
    );

    // The tick manager notifies the same registry the WS handler fills.
    let tick_manager = TickManager::new(
        Arc::clone(&store),
        Arc::clone(&state.registry),
        sync_groups,
    );
    state.tick_stats = tick_manager.stats();
    tick_manager.start();

    let supervisor = Supervisor::new(
        Arc::clone(&state.registry),
        Arc::clone(&state.validator),
        Arc::clone(&store),
        Duration::from_millis(config.heartbeat_timeout_ms),
    );
    supervisor.start();

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;

    worldsync_server::serve(state, listener, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;

    supervisor.cleanup().await;
    tick_manager.cleanup().await;
    Ok(())
}
