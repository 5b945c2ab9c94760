//! Shared application state for the API server.
//!
//! [`AppState`] wires the concurrency core (session registry, pairing
//! coordinator, token signer) to the persistence collaborator. It is
//! wrapped in [`Arc`](std::sync::Arc) and injected via Axum's `State`
//! extractor.

use std::sync::Arc;

use misfortune_core::{PairingCoordinator, SessionRegistry, TokenSigner};
use misfortune_db::{DbError, WheelStore};

/// Default per-user wheel quota.
pub const DEFAULT_MAX_USER_WHEELS: usize = 3;

/// Shared state for the Axum application.
pub struct AppState {
    /// Live wheel sessions, keyed by wheel id.
    pub registry: SessionRegistry,
    /// Pending wheel client registrations.
    pub pairing: PairingCoordinator,
    /// Persistence collaborator for wheel records.
    pub store: Arc<dyn WheelStore>,
    /// Signer for wheel tokens.
    pub tokens: TokenSigner,
    /// Bearer token authenticating the chat bot.
    pub internal_token: String,
    /// Bot name used in pairing deep links.
    pub bot_name: String,
    /// Maximum number of wheels one user may own.
    pub max_user_wheels: usize,
}

impl AppState {
    /// Create application state over a store and token signer.
    pub fn new(
        store: Arc<dyn WheelStore>,
        tokens: TokenSigner,
        internal_token: impl Into<String>,
        bot_name: impl Into<String>,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            pairing: PairingCoordinator::new(),
            store,
            tokens,
            internal_token: internal_token.into(),
            bot_name: bot_name.into(),
            max_user_wheels: DEFAULT_MAX_USER_WHEELS,
        }
    }

    /// Override the per-user wheel quota.
    #[must_use]
    pub fn with_max_user_wheels(mut self, max: usize) -> Self {
        self.max_user_wheels = max;
        self
    }

    /// Populate the session registry from persisted wheels.
    ///
    /// Called once at startup, before the server starts accepting
    /// requests.
    pub async fn load_sessions(&self) -> Result<(), DbError> {
        let wheels = self.store.fetch_wheels().await?;
        self.registry.load(wheels).await;
        Ok(())
    }
}

impl core::fmt::Debug for AppState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppState")
            .field("bot_name", &self.bot_name)
            .field("max_user_wheels", &self.max_user_wheels)
            .finish_non_exhaustive()
    }
}
