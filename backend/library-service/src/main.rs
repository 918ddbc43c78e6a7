/// Library Service Main Entry Point
///
/// Starts the gRPC server with:
/// - Token manager and RBAC engine for the auth layer
/// - Cursor codec for list pagination
/// - PostgreSQL adapters, or in-memory ones when no database is configured
use std::sync::Arc;

use anyhow::{Context, Result};
use crypto_core::{CursorCodec, TokenManager};
use library_service::config::{LogFormat, Settings};
use library_service::service::{
    CatalogService, MemoryCatalog, MemoryUserStore, PgCatalog, PgUserStore, ScanTracker,
    UserStore,
};
use library_service::{run, Application};
use rbac::RbacEngine;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    init_tracing(settings.logging.format);

    info!(
        environment = settings.environment.as_str(),
        "Starting Library Service"
    );

    let tokens = Arc::new(
        TokenManager::new(settings.token_config()?).context("Failed to initialize token manager")?,
    );

    let rbac_kind = settings.auth.rbac_kind()?;
    let authorizer = RbacEngine::from_settings(
        rbac_kind,
        settings.auth.rbac_model_path.as_deref(),
        settings.auth.rbac_policy_path.as_deref(),
    )
    .context("Failed to load RBAC policy")?;
    info!(rbac = ?authorizer.kind(), "RBAC engine initialized");

    let cursor = Arc::new(CursorCodec::new(
        &settings.cursor_key()?,
        settings.pagination.cursor_ttl(),
    ));

    let scans = ScanTracker::new();
    let (catalog, users): (Arc<dyn CatalogService>, Arc<dyn UserStore>) =
        match settings.database.url() {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(settings.database.max_connections)
                    .acquire_timeout(settings.database.acquire_timeout())
                    .connect(url)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                info!(
                    max_connections = settings.database.max_connections,
                    "Database pool initialized"
                );
                (
                    Arc::new(PgCatalog::new(pool.clone(), scans)),
                    Arc::new(PgUserStore::new(pool)),
                )
            }
            None => {
                warn!("No database configured; using in-memory storage");
                (
                    Arc::new(MemoryCatalog::with_tracker(scans)),
                    Arc::new(MemoryUserStore::new()),
                )
            }
        };

    let app = Application {
        catalog,
        users,
        tokens,
        authorizer: Arc::new(authorizer),
        cursor,
        limits: settings.pagination.limits(),
        request_timeout: settings.server.request_timeout(),
    };

    let addr = settings.server.addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(run(app, listener, async {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        result = &mut server => {
            // Server ended on its own
            return match result {
                Ok(outcome) => outcome.context("gRPC server error"),
                Err(e) => Err(e).context("gRPC server task failed"),
            };
        }
        _ = shutdown_signal() => {}
    }

    let _ = stop_tx.send(());
    let grace = settings.server.shutdown_grace_period();
    match tokio::time::timeout(grace, &mut server).await {
        Ok(Ok(Ok(()))) => info!("Library service shutdown complete"),
        Ok(Ok(Err(e))) => error!(error = %e, "gRPC server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "gRPC server task failed during shutdown"),
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs(),
                "Grace period elapsed; aborting in-flight calls"
            );
            server.abort();
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("library_service=info,info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
