//! # courier-server
//!
//! Two-party messaging relay.
//!
//! This binary provides:
//! - **Durable message log** (SQLite) that records every message exactly
//!   once before any delivery is attempted
//! - **Push delivery** over WebSocket to recipients that are currently
//!   connected, one live connection per user
//! - **REST API** (axum) for sending, history, conversation listing and
//!   file uploads

mod api;
mod auth;
mod config;
mod conversations;
mod coordinator;
mod error;
mod file_store;
mod registry;
mod ws;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use courier_store::SqliteStore;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::conversations::ConversationIndex;
use crate::coordinator::DeliveryCoordinator;
use crate::file_store::FileStore;
use crate::registry::ConnectionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_server=debug")),
        )
        .init();

    info!("Starting courier relay v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Message store (runs migrations on open)
    let db_path = config.database_path.clone();
    let busy_timeout = config.db_busy_timeout;
    let store = Arc::new(
        tokio::task::spawn_blocking(move || SqliteStore::open(&db_path, busy_timeout)).await??,
    );

    // Upload directory (created if missing)
    let file_store =
        Arc::new(FileStore::new(config.upload_dir.clone(), config.max_upload_size).await?);

    let registry = Arc::new(ConnectionRegistry::new());

    let coordinator = Arc::new(
        DeliveryCoordinator::new(Arc::clone(&store), registry)
            .with_push_buffer(config.push_buffer)
            .with_idle_timeout(config.idle_timeout),
    );

    let app_state = AppState {
        coordinator,
        conversations: ConversationIndex::new(store),
        file_store,
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
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
