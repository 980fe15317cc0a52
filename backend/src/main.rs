use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod db;
mod domain;
mod pages;
mod rest;

use domain::{LookupService, SyncService};
use rest::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Setting up database");
    let db = db::DbConnection::init().await?;

    // Set up our application state
    let state = AppState::new(SyncService::new(db.clone()), LookupService::new(db));

    let app = rest::app(state);

    // Start the server
    let addr: SocketAddr = std::env::var("FARM_TRACKER_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
