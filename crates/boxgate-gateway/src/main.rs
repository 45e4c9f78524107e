//! Boxgate - Dropbox-compatible storage gateway

use boxgate_gateway::{run_server_with_shutdown, BackendKind, GatewayConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "boxgate")]
#[command(about = "Dropbox-compatible gateway over pluggable storage backends")]
#[command(version)]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "BOXGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Storage backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Root directory of the local backend
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "BOXGATE_DEBUG")]
    debug: bool,

    /// JWT secret for token validation
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Disable authentication (for development only!)
    #[arg(long, env = "BOXGATE_NO_AUTH")]
    no_auth: bool,
}

impl Args {
    /// Flags win over the config file and `BOXGATE_*` variables
    fn apply(self, config: &mut GatewayConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if self.jwt_secret.is_some() {
            config.jwt_secret = self.jwt_secret;
        }
        if self.no_auth {
            config.auth_enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("boxgate_gateway={log_level},boxgate_core={log_level},tower_http=debug")
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GatewayConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    tracing::info!("Starting Boxgate on {}", config.bind_addr());
    tracing::info!("Storage backend: {:?}", config.backend);

    if config.backend == BackendKind::Memory {
        tracing::warn!("⚠️  Using in-memory storage - data will NOT persist!");
    }

    if !config.auth_enabled {
        tracing::warn!("⚠️  Authentication is DISABLED - for development only!");
    } else if config.jwt_secret.is_none() {
        anyhow::bail!("authentication is enabled but no JWT secret is configured");
    }

    run_server_with_shutdown(config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
