use anyhow::Context;
use lms_api::{create_router, error, services::seed, telemetry, AppState, Config};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let telemetry = telemetry::init(&config)?;

    tracing::info!(environment = %config.environment, "Starting LMS API");
    error::set_expose_internal_errors(!config.is_production());

    // The driver connects lazily; the first query surfaces connection problems
    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .context("Invalid MongoDB connection string")?;
    let database = mongo_client.database(&config.mongo_database);

    seed::ensure_indexes(&database).await;
    if let Err(e) = seed::bootstrap_admin(&config, &database).await {
        tracing::error!(error = %e, "Admin bootstrap failed");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app_state = Arc::new(AppState::new(config, mongo_client));
    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server stopped");
    telemetry.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
