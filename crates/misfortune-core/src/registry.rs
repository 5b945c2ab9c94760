//! Process-wide mapping from wheel id to live session.
//!
//! Populated at startup from the persistence collaborator and mutated
//! only by wheel creation and deletion. Reads are safe during mutation:
//! the map sits behind its own [`RwLock`] and hands out [`Arc`] handles,
//! so callers never hold the registry lock across state operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use misfortune_types::{UserId, Wheel, WheelId, WheelState};

use crate::session::WheelSession;

/// Access check failures.
///
/// Unknown wheel ids are deliberately indistinguishable from wheels the
/// user may not touch; both come back as `Forbidden`.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The wheel does not exist or the user may not access it.
    #[error("wheel access denied")]
    Forbidden,
}

/// Registry of all live wheel sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<WheelId, Arc<WheelSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the registry from persisted wheel records at startup.
    pub async fn load(&self, wheels: Vec<Wheel>) {
        let mut sessions = self.sessions.write().await;
        for wheel in wheels {
            sessions.insert(wheel.id, Arc::new(WheelSession::new(&wheel)));
        }
        info!(wheels = sessions.len(), "session registry loaded");
    }

    /// Register a session for a newly created wheel.
    pub async fn insert(&self, wheel: &Wheel) -> Arc<WheelSession> {
        let session = Arc::new(WheelSession::new(wheel));
        self.sessions
            .write()
            .await
            .insert(wheel.id, Arc::clone(&session));
        session
    }

    /// Look up the session for a wheel.
    pub async fn get(&self, wheel_id: WheelId) -> Option<Arc<WheelSession>> {
        self.sessions.read().await.get(&wheel_id).cloned()
    }

    /// Remove a deleted wheel's session.
    ///
    /// Returns the removed session so the caller can close it and
    /// terminate subscribed connections.
    pub async fn remove(&self, wheel_id: WheelId) -> Option<Arc<WheelSession>> {
        self.sessions.write().await.remove(&wheel_id)
    }

    /// Verify that `user` may operate on `wheel_id`.
    ///
    /// With `require_owner` the user must own the wheel; without it,
    /// plain accessibility suffices. Returns the session handle so
    /// callers chain directly into state operations.
    pub async fn verify_access(
        &self,
        user: UserId,
        wheel_id: WheelId,
        require_owner: bool,
    ) -> Result<Arc<WheelSession>, AccessError> {
        let session = self.get(wheel_id).await.ok_or(AccessError::Forbidden)?;
        let state = session.snapshot();

        if require_owner && state.owner != user {
            return Err(AccessError::Forbidden);
        }
        if !require_owner && !state.is_accessible(user) {
            return Err(AccessError::Forbidden);
        }

        Ok(session)
    }

    /// Snapshots of all wheels accessible to `user`.
    pub async fn accessible_snapshots(&self, user: UserId) -> Vec<(WheelId, Arc<WheelState>)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| (*id, session.snapshot()))
            .filter(|(_, state)| state.is_accessible(user))
            .collect()
    }

    /// Number of wheels owned by `user` (quota checks).
    pub async fn owned_count(&self, user: UserId) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| session.snapshot().owner == user)
            .count()
    }
}
