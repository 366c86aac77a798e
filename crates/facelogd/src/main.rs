use anyhow::Result;
use facelog_store::SqliteStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod report;
mod service;

use config::{BusKind, Config};
use dbus_interface::{FaceLogInterface, BUS_NAME, OBJECT_PATH};
use service::AuthLogService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facelogd starting");

    let config = Config::from_env()?;
    let store = SqliteStore::open(&config.db_path).await?;
    let shared = Arc::new(store.clone());
    let service = AuthLogService::new(shared.clone(), shared, config.limits());
    let interface = FaceLogInterface::new(
        Arc::new(service),
        config.db_path.clone(),
        config.default_page_size,
    );

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, interface)?
        .build()
        .await?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "facelogd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facelogd shutting down");

    drop(conn);
    store.close().await?;

    Ok(())
}
