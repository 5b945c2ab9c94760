//! Error types for the API layer.
//!
//! [`ApiError`] unifies the typed outcomes of the concurrency core into
//! a single enum with an [`IntoResponse`] implementation, so handlers
//! propagate with `?` and the edge maps each category to a distinct
//! status code: authorization failures are 403, illegal state
//! transitions 409, unknown resources 404, quota exhaustion 402, and
//! everything infrastructural 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use misfortune_core::{AccessError, NotifyError, PairingError, SessionError, TokenError};
use misfortune_db::DbError;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing, mismatched, or insufficient credentials.
    #[error("forbidden")]
    Forbidden,

    /// The request is an illegal state transition.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    /// The addressed resource does not exist (any more).
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// The user's wheel quota is exhausted.
    #[error("wheel limit reached")]
    WheelLimit,

    /// The persistence collaborator failed.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Listener notification failed while committing an update.
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl From<AccessError> for ApiError {
    fn from(error: AccessError) -> Self {
        match error {
            AccessError::Forbidden => Self::Forbidden,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::CodeMismatch => Self::Forbidden,
            SessionError::AlreadyLocked => Self::Conflict("wheel is already locked"),
            SessionError::NoDrinks => Self::Conflict("wheel has no drinks"),
            SessionError::Notify(e) => Self::Notify(e),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(_error: TokenError) -> Self {
        // Malformed, tampered, and expired tokens are one uniform
        // outcome to callers.
        Self::Forbidden
    }
}

impl From<PairingError> for ApiError {
    fn from(error: PairingError) -> Self {
        match error {
            PairingError::UnknownRegistration | PairingError::Timeout => {
                Self::NotFound("registration")
            }
            PairingError::Notify(e) => Self::Notify(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            Self::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::WheelLimit => (StatusCode::PAYMENT_REQUIRED, self.to_string()),
            Self::Db(e) => {
                tracing::error!(error = %e, "persistence failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("persistence failure"),
                )
            }
            Self::Notify(e) => {
                tracing::error!(error = %e, "notification failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("notification failure"),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
