use security_service::{
    build_router,
    config::{SecurityServiceConfig, StorageBackend},
    db,
    services::TracingAlertSink,
    store::{MemoryStore, PgStore, SecurityStore},
    AppState,
};
use service_core::observability::{init_metrics, init_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = SecurityServiceConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.common.otlp_endpoint.as_deref(),
    );

    let metrics = init_metrics();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting security service"
    );

    let store: Arc<dyn SecurityStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config.storage.database)
                .await
                .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
            db::run_migrations(&pool)
                .await
                .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::build(config.clone(), store, Arc::new(TracingAlertSink), metrics)?;

    // Recurring maintenance: expired sessions, retention purge, stale rate
    // counters. Convergent, so overlap with operator-triggered runs is fine.
    let maintenance = state.maintenance.clone();
    let interval_minutes = config.retention.cleanup_interval_minutes.max(1);
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_minutes * 60));
        ticker.tick().await; // First tick completes immediately
        loop {
            ticker.tick().await;
            if let Err(e) = maintenance.run_cleanup().await {
                tracing::error!(error = %e, "Maintenance cleanup failed");
            }
        }
    });

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
