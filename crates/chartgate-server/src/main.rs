//! Chartgate gateway binary.
//!
//! Serves the release API until Ctrl+C or SIGTERM.

use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use chartgate_server::{AppState, ServerConfig, router};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chartgate=info".parse::<Directive>().into_diagnostic()?),
        )
        .init();

    let config = ServerConfig::parse();
    info!(
        listen = %config.socket_addr(),
        helm = %config.helm_binary.display(),
        strategy = ?config.credential_strategy,
        "Chartgate starting"
    );

    let state = Arc::new(AppState::from_config(&config)?);

    // Requests retry initialization, so a missing binary is not fatal here
    if let Err(e) = state.manager.initialize().await {
        warn!(error = %e, "Helm client not initialized");
    }

    let listener = tokio::net::TcpListener::bind(config.socket_addr())
        .await
        .into_diagnostic()?;
    info!(listen = %config.socket_addr(), "Chartgate listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    info!("Chartgate shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
        () = terminate => info!("received SIGTERM, initiating shutdown"),
    }
}
