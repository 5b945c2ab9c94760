//! API server for the Misfortune wheel service.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) where wheel clients authenticate
//!   (or pair) and then receive every committed state change of their
//!   wheel in real time
//! - **Bot REST endpoints** for wheel management (list, create, rename,
//!   delete, drinks, pairing confirmation), authenticated with the
//!   internal bearer token
//! - **Wheel REST endpoints** for the spin/unlock cycle, authenticated
//!   with the ephemeral spin code and the signed wheel token
//!
//! # Architecture
//!
//! Commands flow wire -> handler -> session, always through the
//! session's Observable under its exclusivity lock. Notifications flow
//! session -> Observable -> per-connection listener -> socket. Mutations
//! that touch persisted records persist first and commit to the
//! Observable second, so a store failure leaves in-memory state
//! untouched.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
