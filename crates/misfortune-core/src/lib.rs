//! Concurrency core for the Misfortune wheel service.
//!
//! This crate implements the synchronization primitive and the per-wheel
//! protocol state on top of it:
//!
//! - [`observable`] -- a generic concurrency-safe container that broadcasts
//!   committed value changes to registered listeners
//! - [`session`] -- the per-wheel spin/unlock state machine
//! - [`registry`] -- the process-wide wheel id to session mapping
//! - [`pairing`] -- the bounded-wait handshake binding an anonymous wheel
//!   client to a wheel identity
//! - [`token`] -- signed, time-limited wheel tokens
//!
//! # Concurrency model
//!
//! Each wheel owns one [`Observable`](observable::Observable); its
//! exclusivity lock is the sole mutation gate for that wheel's state.
//! Updates to one wheel are totally ordered; different wheels share
//! nothing. Listener notifications for a committed update run
//! concurrently with each other and all observe the committed value.

pub mod observable;
pub mod pairing;
pub mod registry;
pub mod session;
pub mod token;

// Re-export primary types for convenience.
pub use observable::{AtomicObservable, Listener, ListenerError, ListenerId, NotifyError, Observable};
pub use pairing::{CONFIRMATION_TIMEOUT, PairingCoordinator, PairingError, PendingRegistration};
pub use registry::{AccessError, SessionRegistry};
pub use session::{SessionError, WheelSession, generate_code};
pub use token::{TOKEN_TTL_HOURS, TokenError, TokenSigner};
