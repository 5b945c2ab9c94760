//! Per-wheel session and the spin/unlock state machine.
//!
//! A [`WheelSession`] wraps one [`Observable`] holding the wheel's
//! [`WheelState`] and implements the two legal transitions:
//!
//! ```text
//!            spin(code, speed)
//!  Unlocked ------------------> Locked
//!           <------------------
//!                unlock()
//! ```
//!
//! Both transitions run inside [`Observable::atomic`] so the
//! check-then-act sequences are race-free against concurrent attempts.
//! Authentication happens in the caller: `spin` checks the ephemeral
//! capability code itself, while `unlock` trusts that the API layer has
//! already verified the wheel token.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{Rng, RngCore};
use tokio::sync::watch;
use tracing::info;

use misfortune_types::{Wheel, WheelId, WheelState};

use crate::observable::{NotifyError, Observable};

/// Number of random bytes in a spin capability code.
const CODE_BYTES: usize = 16;

/// Generate an unguessable spin capability code.
///
/// 16 cryptographically random bytes, URL-safe base64 without padding --
/// short enough to render next to the wheel, long enough to be a secret.
pub fn generate_code() -> String {
    let mut bytes = [0_u8; CODE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Errors produced by the spin state machine.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The presented spin code does not match the current capability.
    #[error("spin code mismatch")]
    CodeMismatch,

    /// The wheel is already locked; spinning again is an illegal
    /// transition, reported distinctly from authorization failures.
    #[error("wheel is already locked")]
    AlreadyLocked,

    /// The wheel has no drinks; there is nothing to land on.
    #[error("wheel has no drinks")]
    NoDrinks,

    /// Listener notification failed while committing the transition.
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// The live, in-memory session for one wheel.
///
/// Created at registry load time or on wheel creation, destroyed when
/// the wheel is deleted. The wrapped [`Observable`] is the sole mutation
/// gate for the wheel's state; no code path bypasses it.
#[derive(Debug)]
pub struct WheelSession {
    id: WheelId,
    state: Observable<WheelState>,
    /// Flipped to `true` when the wheel is deleted so subscribed
    /// connections can terminate deterministically.
    closed: watch::Sender<bool>,
}

impl WheelSession {
    /// Create a session for `wheel` with a freshly generated spin code.
    pub fn new(wheel: &Wheel) -> Self {
        Self::with_code(wheel, generate_code())
    }

    /// Create a session with a caller-supplied spin code.
    pub fn with_code(wheel: &Wheel, code: impl Into<String>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id: wheel.id,
            state: Observable::new(WheelState::initial(wheel, code)),
            closed,
        }
    }

    /// The wheel this session belongs to.
    pub const fn id(&self) -> WheelId {
        self.id
    }

    /// The observable wheel state.
    pub const fn state(&self) -> &Observable<WheelState> {
        &self.state
    }

    /// Snapshot of the current state.
    pub fn snapshot(&self) -> Arc<WheelState> {
        self.state.read()
    }

    /// Spin the wheel.
    ///
    /// Valid only while unlocked and with the current capability code.
    /// On success a drink index is drawn uniformly at random, the speed
    /// recorded, and the wheel locks. Runs inside
    /// [`Observable::atomic`] so concurrent spin attempts serialize; the
    /// loser of the race observes [`SessionError::AlreadyLocked`].
    pub async fn spin(&self, presented_code: &str, speed: f64) -> Result<(), SessionError> {
        let atom = self.state.atomic().await;
        let state = atom.read();

        if state.code != presented_code {
            return Err(SessionError::CodeMismatch);
        }
        if state.is_locked {
            return Err(SessionError::AlreadyLocked);
        }
        if state.drinks.is_empty() {
            return Err(SessionError::NoDrinks);
        }

        let current_drink = rand::rng().random_range(0..state.drinks.len());
        info!(wheel = %self.id, current_drink, "wheel spun");

        atom.update(WheelState {
            is_locked: true,
            speed,
            current_drink,
            ..(*state).clone()
        })
        .await?;
        Ok(())
    }

    /// Unlock the wheel after a spin.
    ///
    /// A no-op when already unlocked. Otherwise the lock clears and a
    /// new capability code is generated, invalidating the one used for
    /// the spin -- each code authorizes exactly one spin/unlock cycle.
    pub async fn unlock(&self) -> Result<(), SessionError> {
        let atom = self.state.atomic().await;
        let state = atom.read();

        if !state.is_locked {
            return Ok(());
        }

        info!(wheel = %self.id, "wheel unlocked");
        atom.update(WheelState {
            is_locked: false,
            code: generate_code(),
            ..(*state).clone()
        })
        .await?;
        Ok(())
    }

    /// Mark the session terminated (wheel deleted).
    ///
    /// Subscribed connections observe the flip through
    /// [`closed`](Self::closed) and shut down with a close frame.
    pub fn close(&self) {
        let _ = self.closed.send(true);
    }

    /// Subscribe to session termination.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use misfortune_types::{Drink, UserId};

    use super::*;

    fn two_drink_wheel() -> Wheel {
        let mut wheel = Wheel::create(UserId(1), "Stammtisch");
        wheel.drinks.push(Drink::create("Beer"));
        wheel.drinks.push(Drink::create("Wine"));
        wheel
    }

    #[tokio::test]
    async fn spin_locks_and_picks_valid_drink() {
        let session = WheelSession::with_code(&two_drink_wheel(), "abc");

        session.spin("abc", 1.0).await.unwrap();

        let state = session.snapshot();
        assert!(state.is_locked);
        assert!(state.current_drink < 2);
        assert!((state.speed - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn spin_with_wrong_code_is_rejected_unchanged() {
        let session = WheelSession::with_code(&two_drink_wheel(), "abc");

        let result = session.spin("wrong-code", 1.0).await;
        assert!(matches!(result, Err(SessionError::CodeMismatch)));

        let state = session.snapshot();
        assert!(!state.is_locked);
        assert_eq!(state.code, "abc");
    }

    #[tokio::test]
    async fn second_spin_before_unlock_conflicts() {
        let session = WheelSession::with_code(&two_drink_wheel(), "abc");

        session.spin("abc", 1.0).await.unwrap();
        let result = session.spin("abc", 1.0).await;
        assert!(matches!(result, Err(SessionError::AlreadyLocked)));
    }

    #[tokio::test]
    async fn spin_on_empty_wheel_is_rejected() {
        let wheel = Wheel::create(UserId(1), "Empty");
        let session = WheelSession::with_code(&wheel, "abc");

        let result = session.spin("abc", 1.0).await;
        assert!(matches!(result, Err(SessionError::NoDrinks)));
        assert!(!session.snapshot().is_locked);
    }

    #[tokio::test]
    async fn unlock_regenerates_the_code() {
        let session = WheelSession::with_code(&two_drink_wheel(), "abc");

        session.spin("abc", 1.0).await.unwrap();
        session.unlock().await.unwrap();

        let state = session.snapshot();
        assert!(!state.is_locked);
        assert_ne!(state.code, "abc");

        // The old capability is spent.
        let result = session.spin("abc", 1.0).await;
        assert!(matches!(result, Err(SessionError::CodeMismatch)));

        // The new one works.
        session.spin(&state.code, 2.0).await.unwrap();
    }

    #[tokio::test]
    async fn unlock_while_unlocked_is_a_no_op() {
        let session = WheelSession::with_code(&two_drink_wheel(), "abc");

        session.unlock().await.unwrap();

        let state = session.snapshot();
        assert!(!state.is_locked);
        assert_eq!(state.code, "abc");
    }

    #[tokio::test]
    async fn close_is_observable_by_subscribers() {
        let session = WheelSession::new(&two_drink_wheel());
        let mut closed = session.closed();
        assert!(!*closed.borrow());

        session.close();
        closed.changed().await.unwrap();
        assert!(*closed.borrow());
    }

    #[test]
    fn generated_codes_are_unique_and_urlsafe() {
        let a = generate_code();
        let b = generate_code();
        assert_ne!(a, b);
        assert_eq!(a.len(), 22);
        assert!(!a.contains('='));
        assert!(!a.contains('+'));
        assert!(!a.contains('/'));
    }
}
