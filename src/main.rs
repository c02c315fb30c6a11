use anyhow::{Context, Result};
use media_service::api::{start_api_server, AppState};
use media_service::{
    AccountService, Config, IngestPipeline, MediaStore, ObjectStore, TokenService, UserStore,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting media service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let pool = media_service::db::connect(&config.database)
        .await
        .context("Failed to initialize database pool")?;

    // Run migrations if enabled
    if config.database.run_migrations {
        media_service::db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
    }

    let object_store = Arc::new(
        ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize object store")?,
    );

    let token_service = Arc::new(TokenService::new(
        &config.auth.jwt_secret,
        config.token_ttl(),
    ));

    let user_store = UserStore::new(pool.clone());
    let media_store = MediaStore::new(pool);

    let state = AppState {
        accounts: AccountService::new(Arc::new(user_store), token_service.clone()),
        ingest: Arc::new(IngestPipeline::new(
            object_store,
            Arc::new(media_store.clone()),
            config.upload.clone(),
        )),
        media_store,
        token_service,
    };

    // Spawn API server task
    let http_config = config.http.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(state, &http_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Media service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down media service");

    api_handle.abort();

    info!("Media service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
