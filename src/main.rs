//! MFB Backend Service
//!
//! Main entry point for the mutual fund brokerage backend.
//! This service provides:
//! - REST API for registration, fund lookup, buys and portfolios
//! - Background task that reprices every position at the latest NAV

use anyhow::Context;
use mfb_backend::config::AppConfig;
use mfb_backend::database::{run_migrations, Database};
use mfb_backend::http_service::app_router;
use mfb_backend::nav_client::{PricingGateway, RapidApiClient};
use mfb_backend::services::RefreshScheduler;
use mfb_backend::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "mfb_backend={},sqlx=warn,tower_http=info",
            config.log_level
        )
        .into()
    });

    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("configuration error: {}", e)
    })?;

    init_tracing(&config);

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║            MFB Backend Service Starting                  ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("HTTP port: {}", config.http_port);

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");

    let database = Database::connect(&config.database)
        .await
        .inspect_err(|e| error!("Failed to create database pool: {}", e))
        .context("database connection failed")?;

    info!("Database connection pool created successfully");
    info!("Max connections: {}", config.database.max_connections);

    info!("Running database migrations...");
    run_migrations(database.pool(), None)
        .await
        .inspect_err(|e| error!("Database migration failed: {}", e))
        .context("database migration failed")?;

    info!("Database migrations completed successfully");

    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    info!("Initializing core services...");

    if config.nav_provider.api_key.is_empty() {
        warn!("RAPID_MUT_FUND_KEY is not set - NAV provider calls will be rejected");
    }

    let gateway: Arc<dyn PricingGateway> = Arc::new(
        RapidApiClient::new(&config.nav_provider).context("failed to build NAV provider client")?,
    );
    info!("✓ NAV provider client initialized ({})", config.nav_provider.base_url);

    let app_state = Arc::new(AppState::with_postgres(
        database.pool().clone(),
        gateway,
        &config.auth,
    )?);
    info!("✓ Application state initialized with PostgreSQL stores");

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    info!("Starting background tasks...");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = RefreshScheduler::new(app_state.ledger.clone(), config.refresh_interval());
    let scheduler_handle = tokio::spawn(scheduler.start(shutdown_rx));
    info!(
        "✓ NAV refresh scheduler started ({}s interval)",
        config.refresh_interval_secs
    );

    // =========================================================================
    // START SERVER
    // =========================================================================
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP server on {}", http_addr))?;

    let router = app_router(app_state.clone(), &config.cors_origins);

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║            MFB Backend Service Ready!                    ║");
    info!("╠══════════════════════════════════════════════════════════╣");
    info!("║  REST API:     {}                              ║", http_addr);
    info!("║  Environment:  {}                               ║", config.environment);
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received, shutting down gracefully...");
        })
        .await;

    if let Err(e) = &served {
        error!("HTTP server error: {}", e);
    }

    shutdown_tx.send(true).ok();
    if let Err(e) = scheduler_handle.await {
        error!("NAV refresh scheduler task failed: {}", e);
    }

    database.close().await;
    info!("MFB backend service shutdown complete");

    served.context("HTTP server error")
}
