//! # parley-server
//!
//! Realtime two-party chat server.
//!
//! This binary provides:
//! - **Realtime message dispatch** over WebSockets: inbound send/edit
//!   events are durably stored, fanned out to every live connection of the
//!   recipient, and echoed back to the originator as confirmation
//! - **Presence tracking** via an in-memory connection registry keyed by
//!   user identity (`user:<id>` channels, multi-device fan-out)
//! - **REST API** (axum) for health checks and the non-realtime message
//!   history/edit/delete path

mod api;
mod config;
mod connection;
mod dispatch;
mod error;
mod registry;
mod ws;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::registry::ConnectionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting parley server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Message store (runs migrations on open).  Without an explicit path
    // the store places the file in the platform data directory.
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    // Presence registry and dispatcher, constructed once per process and
    // injected into every handler.  Registry state is intentionally not
    // durable: it is rebuilt as connections open.
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));

    let http_addr = config.http_addr;
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        registry,
        dispatcher,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
