use std::sync::Arc;

use iam_db_connector::{
    credentials::{CredentialCache, CredentialRefresher, StaticTokenProvider},
    datalayer::{
        db_ops::{ConnectionLifecycleManager, DbConfig, PgConnector},
        dsn::{parse_dsn, strip_secret},
    },
    logging::init_logging,
    routes::create_router,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables first
    dotenvy::dotenv().ok();

    init_logging(None)?;

    tracing::info!("Starting IAM database connector");

    let config = DbConfig::default();
    let effective_lifetime = config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid connector configuration");
        e
    })?;

    let components = parse_dsn(&config.database_url)?;
    let username = components.resolve_username(config.username.as_deref())?;
    tracing::info!(
        dsn = %strip_secret(&config.database_url)?,
        endpoint = %components.endpoint(),
        username = %username,
        "Connection string decomposed"
    );

    let provider = Arc::new(StaticTokenProvider::from_env(username)?);
    let cache = CredentialCache::new(
        provider,
        config.cache.clone().set_endpoint(components.endpoint()),
    )?;

    let connector = PgConnector::new(config.pool.clone());
    connector.policy().check_against(effective_lifetime);

    let manager = Arc::new(ConnectionLifecycleManager::new(
        connector,
        components,
        config.grace_period,
    ));
    let generation = manager.start(&cache).await?;
    tracing::info!(generation = %generation.id(), "Database pool ready");

    let refresher = CredentialRefresher::spawn(cache.clone(), effective_lifetime, config.refresh_jitter);

    let app = create_router(AppState::new(cache, manager.clone()));

    // Get server address from environment or use default
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        address = %addr,
        port = %port,
        "Server listening and ready to accept connections"
    );

    tracing::info!(
        endpoints = ?vec![
            "/health - credential and pool status",
            "/health/live - liveness probe",
            "/health/ready - readiness probe",
        ],
        "Available API endpoints"
    );

    // Start the server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresher.shutdown().await;
    manager.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::warn!("Shutdown signal received, cleaning up...");
}
