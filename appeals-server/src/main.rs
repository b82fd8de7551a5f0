use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

use appeals_server::appeals::SqliteRepository;
use appeals_server::config::Config;
use appeals_server::routes::app;
use appeals_server::{AppState, AppealLifecycle};

/// Resolves when the process receives Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining requests");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!(
        "Starting {} service v{}",
        appeals_server::SERVICE_NAME,
        appeals_server::get_version()
    );

    let config = Config::from_env().context("Failed to load configuration")?;

    let db_path = config.database_path();
    info!("Using appeals database: {}", db_path.display());
    let repository = SqliteRepository::new(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let app_state = Arc::new(AppState {
        lifecycle: AppealLifecycle::new(Arc::new(repository)),
    });

    let listener = TcpListener::bind(config.listen_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_address()))?;
    info!("Server listening on {}", config.listen_address());

    axum::serve(listener, app(app_state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Last handle to the repository; dropping it closes the connection.
    drop(app_state);
    info!("Database closed, exiting");

    Ok(())
}
