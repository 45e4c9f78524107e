//! Server startup and lifecycle

use crate::{routes, AppState, GatewayConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Run the gateway server
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    run_server_with_shutdown(config, std::future::pending()).await
}

/// Run server with graceful shutdown
pub async fn run_server_with_shutdown(
    config: GatewayConfig,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config.clone()).await?);
    let cleanup = spawn_cleanup(Arc::clone(&state));
    let app = routes::create_router(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("🚀 Boxgate listening on http://{}", addr);
    info!("📦 Dropbox-compatible API ready for requests");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await;
    cleanup.abort();
    served?;

    info!("👋 Gateway shutdown complete");

    Ok(())
}

/// Periodically drop finished jobs and abandoned upload sessions
pub fn spawn_cleanup(state: Arc<AppState>) -> JoinHandle<()> {
    let every = Duration::from_secs(state.config.cleanup_interval_secs.max(1));
    let max_age = state.config.job_expiry();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("Sweeping expired jobs and upload sessions");
            state.storage.cleanup_expired(max_age).await;
        }
    })
}
