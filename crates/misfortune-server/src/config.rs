//! Configuration types for the service binary.
//!
//! All configuration is loaded from environment variables. The server
//! needs the database connection string, the two shared secrets, and
//! the bot name used in pairing deep links.

use crate::error::ServerSetupError;

/// Default per-user wheel quota.
const DEFAULT_MAX_USER_WHEELS: usize = 3;

/// Complete server configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// `PostgreSQL` connection URL.
    pub database_url: String,
    /// Bearer token authenticating the chat bot.
    pub internal_token: String,
    /// Secret for signing wheel tokens.
    pub token_secret: String,
    /// Bot name used in pairing deep links.
    pub telegram_bot_name: String,
    /// Host address to bind to.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Maximum number of wheels one user may own.
    pub max_user_wheels: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `DATABASE_URL` -- `PostgreSQL` connection string
    /// - `INTERNAL_TOKEN` -- shared secret for the chat bot
    /// - `TOKEN_SECRET` -- signing secret for wheel tokens
    /// - `TELEGRAM_BOT_NAME` -- bot name for pairing deep links
    ///
    /// Optional variables:
    /// - `HOST` -- bind address (default `0.0.0.0`)
    /// - `PORT` -- listen port (default `8080`)
    /// - `MAX_USER_WHEELS` -- per-user wheel quota (default `3`)
    pub fn from_env() -> Result<Self, ServerSetupError> {
        Ok(Self {
            database_url: env_var("DATABASE_URL")?,
            internal_token: env_var("INTERNAL_TOKEN")?,
            token_secret: env_var("TOKEN_SECRET")?,
            telegram_bot_name: env_var("TELEGRAM_BOT_NAME")?,
            host: env_var_or("HOST", "0.0.0.0"),
            port: env_var_parsed("PORT", 8080)?,
            max_user_wheels: env_var_parsed("MAX_USER_WHEELS", DEFAULT_MAX_USER_WHEELS)?,
        })
    }
}

/// Read a required environment variable.
fn env_var(name: &'static str) -> Result<String, ServerSetupError> {
    std::env::var(name).map_err(|_missing| ServerSetupError::MissingEnv(name))
}

/// Read an optional environment variable with a default.
fn env_var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_missing| default.to_owned())
}

/// Read and parse an optional environment variable.
fn env_var_parsed<T: std::str::FromStr>(
    name: &'static str,
    default: T,
) -> Result<T, ServerSetupError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_invalid| ServerSetupError::InvalidEnv(name)),
        Err(_missing) => Ok(default),
    }
}
