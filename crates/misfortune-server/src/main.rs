//! Service entry point for the Misfortune wheel API.
//!
//! Initializes logging, loads configuration from environment variables,
//! connects to `PostgreSQL`, loads the session registry from the
//! persisted wheel records, then serves the HTTP + `WebSocket` API
//! until the process is terminated.

mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use misfortune_api::{AppState, ServerConfig, start_server};
use misfortune_core::TokenSigner;
use misfortune_db::{PostgresPool, PostgresWheelStore};

use crate::config::Config;
use crate::error::ServerSetupError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, database setup, or the server
/// itself fails.
#[tokio::main]
async fn main() -> Result<(), ServerSetupError> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("misfortune-server starting");

    // Load configuration from environment
    let config = Config::from_env()?;
    info!(
        host = config.host,
        port = config.port,
        max_user_wheels = config.max_user_wheels,
        "configuration loaded"
    );

    // Connect to PostgreSQL and apply migrations
    let pool = PostgresPool::connect_url(&config.database_url).await?;
    pool.migrate().await?;
    let store = Arc::new(PostgresWheelStore::new(pool));

    // Build shared state and load wheel sessions
    let state = Arc::new(
        AppState::new(
            store,
            TokenSigner::new(config.token_secret.as_bytes()),
            config.internal_token,
            config.telegram_bot_name,
        )
        .with_max_user_wheels(config.max_user_wheels),
    );
    state.load_sessions().await?;

    // Serve until terminated
    let server_config = ServerConfig {
        host: config.host,
        port: config.port,
    };
    start_server(&server_config, state).await?;

    Ok(())
}
