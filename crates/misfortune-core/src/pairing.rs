//! Bounded-wait pairing handshake for anonymous wheel clients.
//!
//! A freshly connected wheel client without a token asks for
//! registration. The [`PairingCoordinator`] mints an unguessable
//! [`RegistrationId`], parks the connection on a per-registration
//! [`Observable`], and waits for the wheel owner to confirm through a
//! separate authenticated channel. Confirmation flows through the
//! registration's own single-value Observable, so concurrent
//! confirmation attempts serialize on its lock instead of corrupting
//! the pending map.
//!
//! Entries are removed by the [`PendingRegistration`] drop guard, so
//! cleanup is guaranteed on success, timeout, and client disconnect
//! alike. A confirmation arriving after removal is reported as
//! [`PairingError::UnknownRegistration`], never silently dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::debug;

use misfortune_types::{RegistrationId, WheelId};

use crate::observable::{NotifyError, Observable};

/// How long a pending registration waits for owner confirmation.
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Map of registrations currently awaiting confirmation.
type PendingMap = Arc<Mutex<BTreeMap<RegistrationId, Arc<Observable<Option<WheelId>>>>>>;

/// Errors produced by the pairing handshake.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    /// The registration id is unknown -- never issued, already
    /// confirmed, or expired and cleaned up.
    #[error("unknown or expired registration")]
    UnknownRegistration,

    /// No confirmation arrived within the bound.
    #[error("pairing confirmation timed out")]
    Timeout,

    /// Notifying the waiting connection failed.
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Coordinator owning the pending-registration map.
///
/// Cheap to clone; all clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct PairingCoordinator {
    pending: PendingMap,
}

impl PairingCoordinator {
    /// Create a coordinator with no pending registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new pending registration.
    ///
    /// Returns a guard whose [`wait`](PendingRegistration::wait)
    /// resolves once the owner confirms. Dropping the guard (on any
    /// path) removes the map entry.
    pub fn begin(&self) -> PendingRegistration {
        let id = RegistrationId::new();
        let observable = Arc::new(Observable::new(None::<WheelId>));

        // Bridge the registration's Observable to a watch channel the
        // waiting connection can park on.
        let (tx, confirmed) = watch::channel(None::<WheelId>);
        observable.add_listener(Arc::new(move |value: Arc<Option<WheelId>>| {
            let tx = tx.clone();
            async move {
                // The waiter may already be gone; confirmation then
                // resolves against the map, not this channel.
                let _ = tx.send(*value);
                Ok(())
            }
            .boxed()
        }));

        lock_pending(&self.pending).insert(id, observable);
        debug!(registration = %id, "pairing registration opened");

        PendingRegistration {
            pending: Arc::clone(&self.pending),
            id,
            confirmed,
        }
    }

    /// Confirm a pending registration, binding it to `wheel_id`.
    ///
    /// Called from the owner's authenticated channel. Fails with
    /// [`PairingError::UnknownRegistration`] when the registration has
    /// already resolved, timed out, or never existed.
    pub async fn confirm(
        &self,
        registration_id: RegistrationId,
        wheel_id: WheelId,
    ) -> Result<(), PairingError> {
        let observable = lock_pending(&self.pending)
            .get(&registration_id)
            .cloned()
            .ok_or(PairingError::UnknownRegistration)?;

        observable.update(Some(wheel_id)).await?;
        debug!(registration = %registration_id, wheel = %wheel_id, "pairing confirmed");
        Ok(())
    }
}

/// Lock the pending map, recovering from poisoning.
fn lock_pending(
    pending: &Mutex<BTreeMap<RegistrationId, Arc<Observable<Option<WheelId>>>>>,
) -> MutexGuard<'_, BTreeMap<RegistrationId, Arc<Observable<Option<WheelId>>>>> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A registration awaiting owner confirmation.
///
/// Removes its map entry on drop, regardless of how the wait ended.
#[derive(Debug)]
pub struct PendingRegistration {
    pending: PendingMap,
    id: RegistrationId,
    confirmed: watch::Receiver<Option<WheelId>>,
}

impl PendingRegistration {
    /// The registration's opaque handle, for the pairing descriptor.
    pub const fn id(&self) -> RegistrationId {
        self.id
    }

    /// Wait up to `timeout` for the owner to confirm.
    ///
    /// Consumes the guard: whether this resolves, times out, or the
    /// enclosing task is cancelled, the registration entry is removed.
    pub async fn wait(mut self, timeout: Duration) -> Result<WheelId, PairingError> {
        let confirmed = tokio::time::timeout(timeout, self.confirmed.wait_for(Option::is_some))
            .await
            .map_err(|_elapsed| PairingError::Timeout)?
            .map_err(|_closed| PairingError::UnknownRegistration)?;

        // wait_for only returns once a wheel id is present.
        let wheel_id = (*confirmed).ok_or(PairingError::UnknownRegistration);
        drop(confirmed);
        wheel_id
    }
}

impl Drop for PendingRegistration {
    fn drop(&mut self) {
        lock_pending(&self.pending).remove(&self.id);
        debug!(registration = %self.id, "pairing registration closed");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn confirm_unknown_registration_is_not_found() {
        let coordinator = PairingCoordinator::new();
        let result = coordinator.confirm(RegistrationId::new(), WheelId::new()).await;
        assert!(matches!(result, Err(PairingError::UnknownRegistration)));
    }

    #[tokio::test]
    async fn confirmation_resolves_the_wait() {
        let coordinator = PairingCoordinator::new();
        let registration = coordinator.begin();
        let registration_id = registration.id();
        let wheel_id = WheelId::new();

        let confirming = coordinator.clone();
        let confirm = tokio::spawn(async move {
            confirming.confirm(registration_id, wheel_id).await
        });

        let bound = registration.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(bound, wheel_id);
        confirm.await.unwrap().unwrap();

        // The entry is gone once the wait resolved.
        let late = coordinator.confirm(registration_id, WheelId::new()).await;
        assert!(matches!(late, Err(PairingError::UnknownRegistration)));
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_registration_times_out_and_is_removed() {
        let coordinator = PairingCoordinator::new();
        let registration = coordinator.begin();
        let registration_id = registration.id();

        let result = registration.wait(CONFIRMATION_TIMEOUT).await;
        assert!(matches!(result, Err(PairingError::Timeout)));

        let late = coordinator.confirm(registration_id, WheelId::new()).await;
        assert!(matches!(late, Err(PairingError::UnknownRegistration)));
    }

    #[tokio::test]
    async fn dropping_the_guard_cleans_up() {
        let coordinator = PairingCoordinator::new();
        let registration = coordinator.begin();
        let registration_id = registration.id();

        drop(registration);

        let result = coordinator.confirm(registration_id, WheelId::new()).await;
        assert!(matches!(result, Err(PairingError::UnknownRegistration)));
    }

    #[tokio::test]
    async fn repeated_confirmations_do_not_corrupt_the_binding() {
        let coordinator = PairingCoordinator::new();
        let registration = coordinator.begin();
        let registration_id = registration.id();

        let first = WheelId::new();
        let second = WheelId::new();
        coordinator.confirm(registration_id, first).await.unwrap();
        coordinator.confirm(registration_id, second).await.unwrap();

        // Last write wins; the waiter observes a single coherent value.
        let bound = registration.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(bound, second);
    }
}
