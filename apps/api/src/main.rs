//! # Meridian API Server
//!
//! Binds the checkout service to HTTP. See [`routes`] for the surface.

mod config;
mod error;
mod routes;

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meridian_db::{Database, DbConfig, FsSlipStore, OrderService};

use crate::config::ApiConfig;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ApiConfig::from_env()?;
    info!(
        addr = %config.addr,
        db = %config.database_path.display(),
        "Starting Meridian API"
    );

    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    let orders = OrderService::new(db.clone(), Arc::new(FsSlipStore::new(&config.slips_dir)));

    let state = AppState {
        db,
        orders,
        default_user_id: config.default_user_id,
    };

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "Failed to install shutdown handler");
        return;
    }
    info!("Shutdown signal received");
}
