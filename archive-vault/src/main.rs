//! archive-vault - single-page archive for institutional PDF submissions
//!
//! Establishes an anonymous session, keeps a live sorted view of the
//! session's records and serves the submission form and record list.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use archive_common::config::{resolve_config_path, Backend, TomlConfig, VaultConfig};
use archive_vault::{build_router, connect_backends, default_clipboard, AppState};

/// Command-line arguments; each overrides environment and config file
#[derive(Parser, Debug)]
#[command(name = "archive-vault", version, about)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    bind_address: Option<String>,

    /// Backend: memory or firestore
    #[arg(long)]
    backend: Option<Backend>,

    /// Identity provider API key
    #[arg(long)]
    api_key: Option<String>,

    /// Document store project id
    #[arg(long)]
    project_id: Option<String>,

    /// Default log filter (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn into_layer(self) -> TomlConfig {
        TomlConfig {
            api_key: self.api_key,
            project_id: self.project_id,
            backend: self.backend,
            bind_address: self.bind_address,
            port: self.port,
            log_level: self.log_level,
            ..TomlConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = resolve_config_path(args.config.as_deref());

    let mut config =
        VaultConfig::load_from(config_path.as_deref()).context("Failed to load configuration")?;
    config.apply(args.into_layer());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting archive-vault v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) if path.exists() => info!("Loading config file: {}", path.display()),
        Some(path) => warn!("Config file not found: {} (using defaults)", path.display()),
        None => info!("No config file located (using defaults)"),
    }

    config.validate().context("Invalid configuration")?;

    let (identity, store) = connect_backends(&config).context("Failed to connect backends")?;
    let addr = config.listen_addr();

    let state = AppState::new(config, identity, store, default_clipboard());
    let followers = state.start().await;
    if state.session.is_ready() {
        info!("Session ready");
    } else {
        info!("Session not established; UI stays in loading state");
    }

    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("archive-vault listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.shutdown();
    for follower in followers {
        follower.abort();
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
