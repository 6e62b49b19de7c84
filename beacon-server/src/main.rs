//! beacon-server binary entry point

use std::net::SocketAddr;
use std::sync::Arc;

use beacon_server::error::{Error, Result};
use beacon_server::http;
use beacon_server::ingest::IngestService;
use beacon_server::store::EventStore;
use beacon_server::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load()?;

    let _logging_guard = beacon_core::logging::init(
        &config.logging.level,
        &ServerConfig::state_dir(),
        "beacon-server.log",
    )
    .map_err(|e| Error::Config(format!("failed to initialize logging: {}", e)))?;

    let database_path = config.database_path();
    tracing::info!(path = %database_path.display(), "Opening event store");
    let store = EventStore::open(&database_path)?;
    store.migrate()?;

    let service = Arc::new(IngestService::new(Arc::new(store)));
    let app = http::router(service);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, "Listening for event batches");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
