//! Persistence layer for the Misfortune wheel service.
//!
//! Wheel records live in `PostgreSQL`; this crate provides the narrow
//! create/read/update/delete interface the rest of the workspace
//! consumes. There are no transactional guarantees beyond single-row
//! atomicity -- callers sequence their own persist-then-commit steps.
//!
//! # Modules
//!
//! - [`postgres`] -- connection pool, configuration, migrations
//! - [`store`] -- the [`WheelStore`] seam and its `PostgreSQL` implementation
//! - [`error`] -- shared error types

pub mod error;
pub mod postgres;
pub mod store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use store::{PostgresWheelStore, WheelStore};
