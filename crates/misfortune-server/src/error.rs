//! Error types for server startup.

use misfortune_api::ServerError;
use misfortune_db::DbError;

/// Errors that can occur while bringing the service up.
#[derive(Debug, thiserror::Error)]
pub enum ServerSetupError {
    /// A required environment variable is not set.
    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),

    /// An environment variable could not be parsed.
    #[error("invalid environment variable: {0}")]
    InvalidEnv(&'static str),

    /// Connecting to or migrating the database failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The HTTP server failed to start.
    #[error(transparent)]
    Server(#[from] ServerError),
}
