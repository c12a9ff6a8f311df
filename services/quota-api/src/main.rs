//! eduquota API server
//!
//! Serves the student, course and enrollment records, queues a quota
//! reconciliation whenever an enrollment changes, and exposes bulk and
//! direct quota operations.

use std::sync::Arc;

use anyhow::Result;
use eduq_quota_api::{api, config, db::Database, openstack, state::AppState, trigger};
use eduq_reconcile::{MockQuotaBackend, Reconciler};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to QUOTA_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting eduquota API");
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    let db = match Database::connect(&config.database).await {
        Ok(db) => {
            info!("Database connection established");
            db
        }
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return Err(e.into());
        }
    };

    // Run migrations in dev mode
    if config.dev_mode {
        info!("Running database migrations (dev mode)");
        if let Err(e) = db.run_migrations().await {
            error!(error = %e, "Failed to run migrations");
            return Err(e.into());
        }
    }

    let catalog = config.load_catalog()?;
    info!(profiles = ?catalog.names().collect::<Vec<_>>(), "Profile catalog loaded");

    let mut reconciler = Reconciler::new(db.records(), Arc::new(catalog));
    if config.mock_backends {
        warn!("Using in-process mock quota backends");
        reconciler = reconciler.with_backends(Arc::new(MockQuotaBackend::new()).backends());
    } else if let Some(openstack) = &config.openstack {
        info!(auth_url = %openstack.auth_url, region = %openstack.region_name, "OpenStack quota backends configured");
        reconciler = reconciler.with_backends(openstack::quota_backends(openstack)?);
    } else {
        warn!("No quota backends configured; reconciliations will stay pending");
    }

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the reconcile trigger worker in background
    let (reconcile_trigger, trigger_worker) = trigger::reconcile_queue(
        reconciler.clone(),
        config.trigger_queue_capacity,
        config.trigger_timeout,
    );
    let trigger_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            trigger_worker.run(shutdown_rx).await;
        }
    });

    let state = AppState::new(db, reconciler, reconcile_trigger, config.bulk_timeout);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Spawn the server with graceful shutdown
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, trigger_handle).await {
        warn!(error = %e, "Reconcile trigger worker did not shut down in time");
    }

    info!("eduquota API shutdown complete");
    Ok(())
}
