pub mod error;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod tick;
pub mod validator;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Real-time sync
        .route("/world/ws", get(ws::ws_handler))
        // Session gateway
        .route(
            "/api/auth/session/validate",
            get(routes::session::validate_session),
        )
        .route(
            "/api/auth/session/logout",
            post(routes::session::logout_session),
        )
        // Service stats
        .route("/stats", get(routes::stats::get_stats))
        .layer(cors)
        .with_state(state)
}

/// Serve on a pre-bound listener until `shutdown` resolves.
///
/// Accepting a `TcpListener` lets callers bind port 0 and read the actual
/// port before starting (the WebSocket end-to-end tests rely on this).
pub async fn serve(
    state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(state);

    tracing::info!("worldsync server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
